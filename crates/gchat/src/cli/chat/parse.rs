#![allow(deprecated)]
use std::io::Write;

use crossterm::style::{
    Attribute,
    Color,
    Stylize,
};
use crossterm::{
    Command,
    style,
};
use unicode_width::{
    UnicodeWidthChar,
    UnicodeWidthStr,
};
use winnow::ascii::{
    self,
    digit1,
    space0,
    space1,
    till_line_ending,
};
use winnow::combinator::{
    alt,
    delimited,
    preceded,
    repeat,
    terminated,
};
use winnow::error::{
    ErrMode,
    ErrorKind,
    ParserError,
};
use winnow::prelude::*;
use winnow::stream::{
    AsChar,
    Stream,
};
use winnow::token::{
    any,
    take_till,
    take_until,
    take_while,
};

use crate::cli::chat::output_buffer::MarkdownRenderer;

const CODE_COLOR: Color = Color::Green;
const HEADING_COLOR: Color = Color::Magenta;
const BLOCKQUOTE_COLOR: Color = Color::DarkGrey;
const URL_TEXT_COLOR: Color = Color::Blue;
const URL_LINK_COLOR: Color = Color::DarkGrey;

const DEFAULT_RULE_WIDTH: usize = 40;

#[derive(Debug, thiserror::Error)]
pub enum Error<'a> {
    #[error(transparent)]
    Stdio(#[from] std::io::Error),
    #[error("parse error {1}, input {0}")]
    Winnow(&'a str, ErrorKind),
}

impl<'a> ParserError<&'a str> for Error<'a> {
    fn from_error_kind(input: &&'a str, kind: ErrorKind) -> Self {
        Self::Winnow(*input, kind)
    }

    fn append(
        self,
        _input: &&'a str,
        _checkpoint: &winnow::stream::Checkpoint<&'a str, &'a str>,
        _kind: ErrorKind,
    ) -> Self {
        self
    }
}

#[derive(Debug)]
pub struct ParseState {
    pub terminal_width: Option<usize>,
    pub column: usize,
    pub in_codeblock: bool,
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub set_newline: bool,
    pub newline: bool,
}

impl ParseState {
    pub fn new(terminal_width: Option<usize>) -> Self {
        Self {
            terminal_width,
            column: 0,
            in_codeblock: false,
            bold: false,
            italic: false,
            strikethrough: false,
            set_newline: false,
            newline: true,
        }
    }
}

/// Renders markdown to styled terminal text, wrapping at the terminal width.
///
/// Every call starts from a fresh [ParseState], so a call should be handed complete lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalRenderer {
    terminal_width: Option<usize>,
}

impl TerminalRenderer {
    pub fn new(terminal_width: Option<usize>) -> Self {
        Self { terminal_width }
    }
}

impl MarkdownRenderer for TerminalRenderer {
    fn render(&self, markdown: &str) -> String {
        let mut state = ParseState::new(self.terminal_width);
        let mut out = Vec::new();
        let mut input = markdown;

        while !input.is_empty() {
            match interpret_markdown(input, &mut out, &mut state) {
                Ok(rest) => {
                    input = rest;
                    state.newline = state.set_newline;
                    state.set_newline = false;
                },
                // Every alternative ends with a parser that accepts any char, so this is only
                // reachable on a write error.
                Err(_) => {
                    out.extend_from_slice(input.as_bytes());
                    break;
                },
            }
        }

        if !markdown.ends_with('\n') {
            let _ = queue(&mut out, style::ResetColor);
            let _ = queue(&mut out, style::SetAttribute(Attribute::Reset));
        }

        String::from_utf8_lossy(&out).into_owned()
    }
}

pub fn interpret_markdown<'a, 'b>(
    mut i: &'a str,
    mut o: impl Write + 'b,
    state: &mut ParseState,
) -> PResult<&'a str, Error<'a>> {
    let mut error: Option<Error<'_>> = None;
    let start = i.checkpoint();

    macro_rules! stateful_alt {
        ($($fns:ident),*) => {
            $({
                Stream::reset(&mut i, &start);
                match $fns(&mut o, state).parse_next(&mut i) {
                    Err(ErrMode::Backtrack(e)) => {
                        error = match error {
                            Some(error) => Some(error.or(e)),
                            None => Some(e),
                        };
                    },
                    res => {
                        return res.map(|_| i);
                    }
                }
            })*
        };
    }

    match state.in_codeblock {
        false => {
            stateful_alt!(
                // This pattern acts as a short circuit for alphanumeric plaintext
                // More importantly, it's needed to support manual wordwrapping
                text,
                // multiline patterns
                blockquote,
                codeblock_begin,
                // single line patterns
                horizontal_rule,
                heading,
                bulleted_item,
                numbered_item,
                // inline patterns
                code,
                url,
                bold,
                italic,
                strikethrough,
                line_ending,
                // fallback
                fallback
            );
        },
        true => {
            stateful_alt!(codeblock_end, codeblock_line_ending, codeblock_fallback);
        },
    }

    match error {
        Some(e) => Err(ErrMode::Backtrack(e.append(&i, &start, ErrorKind::Alt))),
        None => Err(ErrMode::assert(&i, "no parsers")),
    }
}

fn text<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        let content = take_while(1.., |t| AsChar::is_alphanum(t) || "+,.!?\"".contains(t)).parse_next(i)?;
        queue_newline_or_advance(&mut o, state, content.width())?;
        queue(&mut o, style::Print(content))?;
        Ok(())
    }
}

fn heading<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        if !state.newline {
            return Err(ErrMode::from_error_kind(i, ErrorKind::Fail));
        }

        let level = terminated(take_while(1.., |c| c == '#'), space1).parse_next(i)?;
        let print = format!("{level} ");

        queue_newline_or_advance(&mut o, state, print.width())?;
        queue(&mut o, style::SetForegroundColor(HEADING_COLOR))?;
        queue(&mut o, style::SetAttribute(Attribute::Bold))?;
        queue(&mut o, style::Print(print))
    }
}

fn bulleted_item<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        if !state.newline {
            return Err(ErrMode::from_error_kind(i, ErrorKind::Fail));
        }

        let ws = (space0, alt(("-", "*")), space1).parse_next(i)?.0;
        let print = format!("{ws}• ");

        queue_newline_or_advance(&mut o, state, print.width())?;
        queue(&mut o, style::Print(print))
    }
}

fn numbered_item<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        if !state.newline {
            return Err(ErrMode::from_error_kind(i, ErrorKind::Fail));
        }

        let (ws, digits, _, _) = (space0, digit1, ".", space1).parse_next(i)?;
        let print = format!("{ws}{digits}. ");

        queue_newline_or_advance(&mut o, state, print.width())?;
        queue(&mut o, style::Print(print))
    }
}

fn horizontal_rule<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        if !state.newline {
            return Err(ErrMode::from_error_kind(i, ErrorKind::Fail));
        }

        (
            space0,
            alt((take_while(3.., '-'), take_while(3.., '*'), take_while(3.., '_'))),
            space0,
            alt((ascii::line_ending, winnow::combinator::eof)),
        )
            .parse_next(i)?;

        state.column = 0;
        state.set_newline = true;

        let rule_width = state.terminal_width.unwrap_or(DEFAULT_RULE_WIDTH);
        queue(&mut o, style::SetForegroundColor(BLOCKQUOTE_COLOR))?;
        queue(&mut o, style::Print(format!("{}\n", "━".repeat(rule_width))))?;
        queue(&mut o, style::ResetColor)
    }
}

fn code<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        "`".parse_next(i)?;
        let code = terminated(take_until(0.., "`"), "`").parse_next(i)?;

        queue_newline_or_advance(&mut o, state, code.width())?;
        queue(&mut o, style::SetForegroundColor(CODE_COLOR))?;
        queue(&mut o, style::Print(code))?;
        queue(&mut o, style::ResetColor)
    }
}

fn blockquote<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        if !state.newline {
            return Err(ErrMode::from_error_kind(i, ErrorKind::Fail));
        }

        let level = repeat::<_, _, Vec<&'_ str>, _, _>(1.., terminated(">", space0))
            .parse_next(i)?
            .len();
        let print = "│ ".repeat(level);

        queue(&mut o, style::SetForegroundColor(BLOCKQUOTE_COLOR))?;
        queue_newline_or_advance(&mut o, state, print.width())?;
        queue(&mut o, style::Print(print))
    }
}

fn bold<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        match state.newline {
            true => {
                alt(("**", "__")).parse_next(i)?;
                queue(&mut o, style::SetAttribute(Attribute::Bold))?;
            },
            false => match state.bold {
                true => {
                    alt(("**", "__")).parse_next(i)?;
                    queue(&mut o, style::SetAttribute(Attribute::NormalIntensity))?;
                },
                false => {
                    preceded(space1, alt(("**", "__"))).parse_next(i)?;
                    queue(&mut o, style::Print(' '))?;
                    queue(&mut o, style::SetAttribute(Attribute::Bold))?;
                },
            },
        };

        state.bold = !state.bold;

        Ok(())
    }
}

fn italic<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        match state.newline {
            true => {
                alt(("*", "_")).parse_next(i)?;
                queue(&mut o, style::SetAttribute(Attribute::Italic))?;
            },
            false => match state.italic {
                true => {
                    alt(("*", "_")).parse_next(i)?;
                    queue(&mut o, style::SetAttribute(Attribute::NoItalic))?;
                },
                false => {
                    preceded(space1, alt(("*", "_"))).parse_next(i)?;
                    queue(&mut o, style::Print(' '))?;
                    queue(&mut o, style::SetAttribute(Attribute::Italic))?;
                },
            },
        };

        state.italic = !state.italic;

        Ok(())
    }
}

fn strikethrough<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        "~~".parse_next(i)?;
        state.strikethrough = !state.strikethrough;
        match state.strikethrough {
            true => queue(&mut o, style::SetAttribute(Attribute::CrossedOut)),
            false => queue(&mut o, style::SetAttribute(Attribute::NotCrossedOut)),
        }
    }
}

fn url<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        let display = delimited("[", take_until(1.., "]("), "]").parse_next(i)?;
        let link = delimited("(", take_till(0.., ')'), ")").parse_next(i)?;

        queue_newline_or_advance(&mut o, state, display.width() + 1)?;
        queue(&mut o, style::SetForegroundColor(URL_TEXT_COLOR))?;
        queue(&mut o, style::Print(format!("{display} ")))?;
        queue(&mut o, style::SetForegroundColor(URL_LINK_COLOR))?;
        state.column += link.width();
        queue(&mut o, style::Print(link))?;
        queue(&mut o, style::ResetColor)
    }
}

fn line_ending<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        ascii::line_ending.parse_next(i)?;

        state.column = 0;
        state.set_newline = true;
        state.bold = false;
        state.italic = false;
        state.strikethrough = false;

        queue(&mut o, style::ResetColor)?;
        queue(&mut o, style::SetAttribute(style::Attribute::Reset))?;
        queue(&mut o, style::Print("\n"))
    }
}

fn fallback<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        let fallback = any.parse_next(i)?;
        if let Some(width) = fallback.width() {
            queue_newline_or_advance(&mut o, state, width)?;
            if fallback != ' ' || state.column != 1 {
                queue(&mut o, style::Print(fallback))?;
            }
        }

        Ok(())
    }
}

fn queue_newline_or_advance<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
    width: usize,
) -> Result<(), ErrMode<Error<'a>>> {
    if let Some(terminal_width) = state.terminal_width {
        if state.column > 0 && state.column + width > terminal_width {
            state.column = width;
            queue(&mut o, style::Print('\n'))?;
            return Ok(());
        }
    }

    // else
    state.column += width;

    Ok(())
}

fn queue<'a>(o: &mut impl Write, command: impl Command) -> Result<(), ErrMode<Error<'a>>> {
    use crossterm::QueueableCommand;
    o.queue(command).map_err(|err| ErrMode::Cut(Error::Stdio(err)))?;
    Ok(())
}

fn codeblock_begin<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        if !state.newline {
            return Err(ErrMode::from_error_kind(i, ErrorKind::Fail));
        }

        let language = preceded("```", till_line_ending).parse_next(i)?;
        ascii::line_ending.parse_next(i)?;

        state.in_codeblock = true;

        if !language.is_empty() {
            queue(&mut o, style::Print(format!("{}\n", language).bold()))?;
        }

        queue(&mut o, style::SetForegroundColor(CODE_COLOR))?;

        Ok(())
    }
}

fn codeblock_end<'a, 'b>(
    mut o: impl Write + 'b,
    state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        "```".parse_next(i)?;
        state.in_codeblock = false;
        queue(&mut o, style::ResetColor)
    }
}

fn codeblock_line_ending<'a, 'b>(
    mut o: impl Write + 'b,
    _state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        ascii::line_ending.parse_next(i)?;
        queue(&mut o, style::Print("\n"))
    }
}

fn codeblock_fallback<'a, 'b>(
    mut o: impl Write + 'b,
    _state: &'b mut ParseState,
) -> impl FnMut(&mut &'a str) -> PResult<(), Error<'a>> + 'b {
    move |i| {
        let fallback = any.parse_next(i)?;
        queue(&mut o, style::Print(fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Renders `$input` and compares it with the output of `$commands` followed by the reset
    /// emitted for input that does not end in a newline.
    macro_rules! validate {
        ($test:ident, $input:literal, [$($commands:expr),+ $(,)?]) => {
            #[test]
            fn $test() -> eyre::Result<()> {
                use crossterm::ExecutableCommand;

                let rendered = TerminalRenderer::new(Some(80)).render($input);

                let mut expected: Vec<u8> = vec![];
                $(expected.execute($commands)?;)+
                expected.execute(style::ResetColor)?;
                expected.execute(style::SetAttribute(Attribute::Reset))?;
                let expected = String::from_utf8(expected)?;

                assert_eq!(rendered, expected);

                Ok(())
            }
        };
    }

    validate!(text_1, "hello world!", [style::Print("hello world!")]);
    validate!(linted_codeblock_1, "```java\nhello world!```", [
        style::SetAttribute(Attribute::Bold),
        style::Print("java\n"),
        style::SetAttribute(Attribute::Reset),
        style::SetForegroundColor(CODE_COLOR),
        style::Print("hello world!"),
        style::ResetColor,
    ]);
    validate!(code_1, "`print`", [
        style::SetForegroundColor(CODE_COLOR),
        style::Print("print"),
        style::ResetColor,
    ]);
    validate!(url_1, "[google](google.com)", [
        style::SetForegroundColor(URL_TEXT_COLOR),
        style::Print("google "),
        style::SetForegroundColor(URL_LINK_COLOR),
        style::Print("google.com"),
        style::ResetColor,
    ]);
    validate!(bold_1, "**hello**", [
        style::SetAttribute(Attribute::Bold),
        style::Print("hello"),
        style::SetAttribute(Attribute::NormalIntensity)
    ]);
    validate!(italic_1, "*hello*", [
        style::SetAttribute(Attribute::Italic),
        style::Print("hello"),
        style::SetAttribute(Attribute::NoItalic)
    ]);
    validate!(strikethrough_1, "~~hello~~", [
        style::SetAttribute(Attribute::CrossedOut),
        style::Print("hello"),
        style::SetAttribute(Attribute::NotCrossedOut)
    ]);
    validate!(fallback_1, "+ % @ . ?", [style::Print("+ % @ . ?")]);
    validate!(horizontal_rule_1, "---", [
        style::SetForegroundColor(BLOCKQUOTE_COLOR),
        style::Print(format!("{}\n", "━".repeat(80))),
        style::ResetColor,
    ]);
    validate!(heading_1, "# Hello World", [
        style::SetForegroundColor(HEADING_COLOR),
        style::SetAttribute(Attribute::Bold),
        style::Print("# Hello World"),
    ]);
    validate!(bulleted_item_1, "- bullet", [style::Print("• bullet")]);
    validate!(bulleted_item_2, "* bullet", [style::Print("• bullet")]);
    validate!(numbered_item_1, "1. number", [style::Print("1. number")]);
    validate!(blockquote_1, "> hello", [
        style::SetForegroundColor(BLOCKQUOTE_COLOR),
        style::Print("│ hello"),
    ]);

    #[test]
    fn test_complete_lines_end_without_trailing_reset() {
        use crossterm::ExecutableCommand;

        let rendered = TerminalRenderer::new(None).render("**bold\nplain\n");
        let mut expected: Vec<u8> = vec![];
        expected.execute(style::SetAttribute(Attribute::Bold)).unwrap();
        expected.execute(style::Print("bold")).unwrap();
        expected.execute(style::ResetColor).unwrap();
        expected.execute(style::SetAttribute(Attribute::Reset)).unwrap();
        expected.execute(style::Print("\nplain")).unwrap();
        expected.execute(style::ResetColor).unwrap();
        expected.execute(style::SetAttribute(Attribute::Reset)).unwrap();
        expected.execute(style::Print("\n")).unwrap();
        assert_eq!(rendered, String::from_utf8(expected).unwrap());
    }

    #[test]
    fn test_wraps_at_terminal_width() {
        let rendered = TerminalRenderer::new(Some(10)).render("aaaaaa bbbbbb\n");
        assert!(rendered.starts_with("aaaaaa \nbbbbbb"), "{rendered:?}");
    }

    #[test]
    fn test_unterminated_code_is_printed_verbatim() {
        let rendered = TerminalRenderer::new(None).render("`open\n");
        assert!(rendered.starts_with("`open"), "{rendered:?}");
    }

    #[test]
    fn test_buffered_output_matches_single_render() {
        use crate::cli::chat::output_buffer::OutputBuffer;

        let documents = [
            "Intro line\n```rust\nfn main() {}\n```\nAfter the block.\n",
            "1. first\n2. second\n3. third",
            "**bold\nacross lines**\nplain\n",
            "> quoted\n> more\n\nbody",
        ];
        let renderer = TerminalRenderer::new(Some(80));

        for document in documents {
            let expected = renderer.render(document);
            for (split, _) in document.char_indices().skip(1) {
                let mut buffer = OutputBuffer::new(renderer);
                let mut rendered = String::new();
                rendered.extend(buffer.append(&document[..split]));
                rendered.extend(buffer.append(&document[split..]));
                rendered.extend(buffer.flush());
                assert_eq!(rendered, expected, "{document:?} split at {split}");
            }
        }
    }
}
