//! Parsing of tagged request blocks.
//!
//! A block's first line is a tag shaped like a C block comment, so the
//! block as a whole stays a valid lex/yacc/C source file:
//!
//! ```text
//! /* lex calc.l -d */
//! %%
//! ...rest of the source...
//! ```
//!
//! Tag tokens are split on whitespace: token 1 names the command, token 2
//! the target file, everything up to the closing marker is passed to the
//! tool verbatim. Every line after the tag is the body.

pub const OPEN_MARKER: &str = "/*";
pub const CLOSE_MARKER: &str = "*/";

/// One command per tag word, with the arguments that word takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Generate a scanner from a lex grammar.
    Lex { source: String, options: Vec<String> },
    /// Generate a parser from a yacc grammar.
    Yacc { source: String, options: Vec<String> },
    /// Compile a C source, linking the lex/yacc runtime libraries.
    CompileC { source: String, options: Vec<String> },
    /// Run the compiled `a.out` interactively against the body.
    RunBinary,
    /// Run a private copy of `a.out` against the body and keep the
    /// transcript diff as an assembly listing next to the source.
    RunCustom { source: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    /// Lines after the tag, verbatim.
    pub body: Vec<String>,
}

/// The two usage errors a malformed block can produce. The texts double
/// as the only usage documentation an interactive caller ever sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("[Kernel] Error: The code must start with '/*' and the format is [/* (lex|yacc|c|uecc) filename */] or [/* a.out */]")]
    NotTagged,

    #[error("[Kernel] Error: The code must be start with /* and the format is [/* (lex|yacc|c|uecc) filename */] or [/* a.out */]")]
    BadCommand,
}

/// Splits a block into its command and body.
pub fn parse(code: &str) -> Result<Request, ParseError> {
    let mut lines = code.lines();
    let tag = lines.next().ok_or(ParseError::NotTagged)?;
    if !(tag.starts_with(OPEN_MARKER) && tag.ends_with(CLOSE_MARKER)) {
        return Err(ParseError::NotTagged);
    }

    let tokens: Vec<&str> = tag.split_whitespace().collect();
    let command = match tokens.get(1).copied() {
        Some("lex") => Command::Lex {
            source: source_token(&tokens)?,
            options: option_tokens(&tokens),
        },
        Some("yacc") => Command::Yacc {
            source: source_token(&tokens)?,
            options: option_tokens(&tokens),
        },
        Some("c") => Command::CompileC {
            source: source_token(&tokens)?,
            options: option_tokens(&tokens),
        },
        Some("a.out") => Command::RunBinary,
        Some("uecc") => Command::RunCustom {
            source: source_token(&tokens)?,
        },
        _ => return Err(ParseError::BadCommand),
    };

    Ok(Request {
        command,
        body: lines.map(|line| line.to_string()).collect(),
    })
}

/// The target filename. A tag like `/* lex */` has the closing marker
/// where the filename belongs; that is a missing argument, not a file.
fn source_token(tokens: &[&str]) -> Result<String, ParseError> {
    match tokens.get(2) {
        Some(&token) if token != CLOSE_MARKER => Ok(token.to_string()),
        _ => Err(ParseError::BadCommand),
    }
}

/// Tokens between the filename and the closing marker.
fn option_tokens(tokens: &[&str]) -> Vec<String> {
    tokens
        .get(3..tokens.len().saturating_sub(1))
        .unwrap_or(&[])
        .iter()
        .map(|s| s.to_string())
        .collect()
}
