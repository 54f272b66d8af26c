use std::io::Write;
use std::sync::Arc;

use crossterm::{
    cursor,
    queue,
    terminal,
};
use parking_lot::Mutex;
use spinners::{
    Spinner,
    Spinners,
};

/// A shared handle to the "Thinking..." spinner.
///
/// The session starts it before a request is sent. Whoever writes to the terminal first (the
/// pipeline on the first text event, or a tool hook) stops it, so the slot is shared between the
/// two.
#[derive(Clone, Default)]
pub struct SpinnerSlot(Arc<Mutex<Option<Spinner>>>);

impl std::fmt::Debug for SpinnerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinnerSlot")
            .field("active", &self.is_active())
            .finish()
    }
}

impl SpinnerSlot {
    pub fn start(&self, output: &mut impl Write, message: &str) -> std::io::Result<()> {
        queue!(output, cursor::Hide)?;
        output.flush()?;
        *self.0.lock() = Some(Spinner::new(Spinners::Dots, message.to_owned()));
        Ok(())
    }

    /// Stops the spinner if it is running and clears its line. Returns whether a spinner was
    /// stopped.
    pub fn stop(&self, output: &mut impl Write) -> std::io::Result<bool> {
        let Some(spinner) = self.0.lock().take() else {
            return Ok(false);
        };
        drop(spinner);
        queue!(
            output,
            terminal::Clear(terminal::ClearType::CurrentLine),
            cursor::MoveToColumn(0),
            cursor::Show
        )?;
        output.flush()?;
        Ok(true)
    }

    pub fn is_active(&self) -> bool {
        self.0.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_without_spinner_is_noop() {
        let slot = SpinnerSlot::default();
        let mut out = Vec::new();
        assert!(!slot.stop(&mut out).unwrap());
        assert!(out.is_empty());
        assert!(!slot.is_active());
    }
}
