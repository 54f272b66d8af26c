use std::fmt::Display;
use std::path::Path;

use serde_json::{
    Map,
    Value,
};
use thiserror::Error;
use tracing::debug;

use crate::util::directories::DirectoryError;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("settings file must contain a JSON object")]
    NotAnObject,
    #[error("{0} is not a valid setting")]
    InvalidSetting(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Setting {
    ChatDefaultModel,
    ChatToolPreference,
    ChatSystemInstruction,
    ApiTimeout,
    ApiBaseUrl,
}

impl AsRef<str> for Setting {
    fn as_ref(&self) -> &'static str {
        match self {
            Self::ChatDefaultModel => "chat.defaultModel",
            Self::ChatToolPreference => "chat.toolPreference",
            Self::ChatSystemInstruction => "chat.systemInstruction",
            Self::ApiTimeout => "api.timeout",
            Self::ApiBaseUrl => "api.baseUrl",
        }
    }
}

impl Display for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl TryFrom<&str> for Setting {
    type Error = SettingsError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "chat.defaultModel" => Ok(Self::ChatDefaultModel),
            "chat.toolPreference" => Ok(Self::ChatToolPreference),
            "chat.systemInstruction" => Ok(Self::ChatSystemInstruction),
            "api.timeout" => Ok(Self::ApiTimeout),
            "api.baseUrl" => Ok(Self::ApiBaseUrl),
            _ => Err(SettingsError::InvalidSetting(value.to_string())),
        }
    }
}

/// User settings, read once at startup.
///
/// The file is owned by the user; this type never writes it back.
#[derive(Debug, Clone, Default)]
pub struct Settings(Map<String, Value>);

impl Settings {
    /// Loads the settings from the default settings path. A missing file is treated as empty.
    pub async fn load() -> Result<Self, SettingsError> {
        if cfg!(test) {
            return Ok(Self::default());
        }

        let path = crate::util::directories::settings_path()?;
        Self::load_from(&path).await
    }

    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(buf) => Self::from_slice(&buf),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no settings file found, using defaults");
                Ok(Self::default())
            },
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_slice(buf: &[u8]) -> Result<Self, SettingsError> {
        if buf.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        match serde_json::from_slice(buf)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(SettingsError::NotAnObject),
        }
    }

    pub fn get(&self, key: Setting) -> Option<&Value> {
        self.0.get(key.as_ref())
    }

    pub fn get_string(&self, key: Setting) -> Option<String> {
        self.get(key).and_then(|value| value.as_str().map(|s| s.into()))
    }

    pub fn get_int(&self, key: Setting) -> Option<i64> {
        self.get(key).and_then(|value| value.as_i64())
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_setting_names_round_trip() {
        for setting in [
            Setting::ChatDefaultModel,
            Setting::ChatToolPreference,
            Setting::ChatSystemInstruction,
            Setting::ApiTimeout,
            Setting::ApiBaseUrl,
        ] {
            assert_eq!(Setting::try_from(setting.as_ref()).unwrap(), setting);
        }
        assert!(matches!(
            Setting::try_from("chat.unknown"),
            Err(SettingsError::InvalidSetting(_))
        ));
    }

    #[test]
    fn test_typed_getters() {
        let settings = Settings::from_slice(
            br#"{"chat.defaultModel": "gemini-2.5-pro", "api.timeout": 1500, "chat.toolPreference": 3}"#,
        )
        .unwrap();

        assert_eq!(
            settings.get_string(Setting::ChatDefaultModel).as_deref(),
            Some("gemini-2.5-pro")
        );
        assert_eq!(settings.get_int(Setting::ApiTimeout), Some(1500));
        // Wrong type reads as unset.
        assert_eq!(settings.get_string(Setting::ChatToolPreference), None);
        assert_eq!(settings.get(Setting::ApiBaseUrl), None);
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(matches!(Settings::from_slice(b"[1, 2]"), Err(SettingsError::NotAnObject)));
        assert!(matches!(Settings::from_slice(b"{"), Err(SettingsError::Json(_))));
        assert_eq!(Settings::from_slice(b"  \n").unwrap().get(Setting::ApiBaseUrl), None);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let missing = Settings::load_from(&path).await.unwrap();
        assert_eq!(missing.get(Setting::ApiBaseUrl), None);

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{"api.baseUrl": "http://localhost:1234"}"#).unwrap();
        drop(file);

        let settings = Settings::load_from(&path).await.unwrap();
        assert_eq!(
            settings.get_string(Setting::ApiBaseUrl).as_deref(),
            Some("http://localhost:1234")
        );
    }
}
