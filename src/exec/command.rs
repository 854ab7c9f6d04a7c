// src/exec/command.rs

//! Command templates with a fixed set of named parameters.
//!
//! A template is parsed once at startup, so a malformed command is reported
//! before anything runs. Arguments may contain `{pkg}`, which is replaced by
//! the changed package key. `{{` and `}}` produce literal braces; any other
//! brace usage that isn't an identifier (`{print $1}`) is left alone.
//!
//! In a `sh -c` line the substituted value is shell-quoted when it contains
//! anything beyond plain path characters, so write `{pkg}` unquoted there.

use std::borrow::Cow;
use std::fmt;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;

use crate::errors::{DevloopError, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

/// Parameters a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateParam {
    /// The changed package key.
    Pkg,
}

impl TemplateParam {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "pkg" => Some(TemplateParam::Pkg),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TemplateParam::Pkg => "pkg",
        }
    }
}

/// Values available while rendering a template.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateContext<'a> {
    pub pkg: Option<&'a str>,
}

impl<'a> TemplateContext<'a> {
    pub fn for_pkg(pkg: &'a str) -> Self {
        Self { pkg: Some(pkg) }
    }

    fn value(&self, param: TemplateParam) -> Option<&'a str> {
        match param {
            TemplateParam::Pkg => self.pkg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(TemplateParam),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ArgTemplate {
    segments: Vec<Segment>,
}

impl ArgTemplate {
    fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(raw) {
            let whole = caps.get(0).expect("capture group 0 always exists");
            literal.push_str(&raw[last..whole.start()]);
            last = whole.end();

            match (whole.as_str(), caps.get(1)) {
                ("{{", _) => literal.push('{'),
                ("}}", _) => literal.push('}'),
                (_, Some(name)) => {
                    let param = TemplateParam::from_name(name.as_str()).ok_or_else(|| {
                        DevloopError::TemplateError(format!(
                            "unknown placeholder {{{}}} in '{}' (available: {{pkg}}; \
                             write {{{{{}}}}} for literal braces)",
                            name.as_str(),
                            raw,
                            name.as_str()
                        ))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Param(param));
                }
                _ => unreachable!("placeholder regex only matches the cases above"),
            }
        }

        literal.push_str(&raw[last..]);
        if !literal.is_empty() || segments.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    fn uses(&self, param: TemplateParam) -> bool {
        self.segments.contains(&Segment::Param(param))
    }

    fn render(&self, ctx: &TemplateContext<'_>, quoting: Quoting) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Param(p) => {
                    let value = ctx.value(*p).ok_or_else(|| {
                        DevloopError::TemplateError(format!(
                            "{{{}}} is not available in this context",
                            p.name()
                        ))
                    })?;
                    out.push_str(&quoting.apply(value));
                }
            }
        }
        Ok(out)
    }
}

/// How substituted values are escaped before they land in an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    /// Each argument reaches the program as-is.
    Verbatim,
    /// The argument is a POSIX shell line.
    Posix,
}

impl Quoting {
    fn apply(self, value: &str) -> Cow<'_, str> {
        match self {
            Quoting::Verbatim => Cow::Borrowed(value),
            Quoting::Posix => posix_quote(value),
        }
    }
}

/// Single-quote `value` for `sh` unless it only holds characters the shell
/// treats literally.
fn posix_quote(value: &str) -> Cow<'_, str> {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./+:,@=%".contains(c));
    if plain {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("'{}'", value.replace('\'', r"'\''")))
    }
}

/// A program plus templated arguments.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    program: String,
    args: Vec<ArgTemplate>,
    source: Vec<String>,
    quoting: Quoting,
}

impl CommandTemplate {
    /// Build a template from an argv-style list. The program name itself is
    /// taken literally.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Result<Self> {
        let (program, rest) = argv.split_first().ok_or_else(|| {
            DevloopError::TemplateError("invalid command: no program given".to_string())
        })?;
        let program = program.as_ref().trim();
        if program.is_empty() {
            return Err(DevloopError::TemplateError(
                "invalid command: empty program name".to_string(),
            ));
        }

        let args = rest
            .iter()
            .map(|a| ArgTemplate::parse(a.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            program: program.to_string(),
            args,
            source: argv.iter().map(|a| a.as_ref().to_string()).collect(),
            quoting: Quoting::Verbatim,
        })
    }

    /// Build a template that runs `line` through the platform shell.
    pub fn shell(line: &str) -> Result<Self> {
        if line.trim().is_empty() {
            return Err(DevloopError::TemplateError(
                "invalid command: empty shell line".to_string(),
            ));
        }
        // TODO: quote substituted values for `cmd /C` as well; its rules
        // differ per program and are not handled yet.
        if cfg!(windows) {
            Self::from_argv(&["cmd", "/C", line])
        } else {
            let mut template = Self::from_argv(&["sh", "-c", line])?;
            template.quoting = Quoting::Posix;
            Ok(template)
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether any argument references `param`.
    pub fn uses(&self, param: TemplateParam) -> bool {
        self.args.iter().any(|a| a.uses(param))
    }

    /// Render the argument list for `ctx`.
    pub fn render_args(&self, ctx: &TemplateContext<'_>) -> Result<Vec<String>> {
        self.args
            .iter()
            .map(|a| a.render(ctx, self.quoting))
            .collect()
    }

    /// Build a ready-to-spawn command with inherited stdout/stderr.
    pub fn command(&self, ctx: &TemplateContext<'_>) -> Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(ctx)?)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        Ok(cmd)
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkg_placeholder_is_substituted_inside_arguments() {
        let t = CommandTemplate::from_argv(&["go", "test", "./{pkg}/...", "-run={pkg}"]).unwrap();
        assert!(t.uses(TemplateParam::Pkg));
        let args = t.render_args(&TemplateContext::for_pkg("net/http")).unwrap();
        assert_eq!(args, vec!["test", "./net/http/...", "-run=net/http"]);
    }

    #[test]
    fn braces_that_are_not_placeholders_stay_literal() {
        let t = CommandTemplate::from_argv(&["awk", "{print $1}", "{{pkg}}"]).unwrap();
        assert!(!t.uses(TemplateParam::Pkg));
        let args = t.render_args(&TemplateContext::default()).unwrap();
        assert_eq!(args, vec!["{print $1}", "{pkg}"]);
    }

    #[test]
    fn unknown_placeholder_is_rejected_at_parse_time() {
        let err = CommandTemplate::from_argv(&["echo", "{package}"]).unwrap_err();
        assert!(matches!(err, DevloopError::TemplateError(msg) if msg.contains("{package}")));
    }

    #[test]
    fn empty_command_is_invalid() {
        let empty: [&str; 0] = [];
        assert!(CommandTemplate::from_argv(&empty).is_err());
        assert!(CommandTemplate::shell("   ").is_err());
    }

    #[test]
    fn rendering_pkg_without_a_package_fails() {
        let t = CommandTemplate::from_argv(&["go", "install", "{pkg}"]).unwrap();
        assert!(t.render_args(&TemplateContext::default()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn shell_template_wraps_line_in_sh() {
        let t = CommandTemplate::shell("go test {pkg} && go install {pkg}").unwrap();
        assert_eq!(t.program(), "sh");
        let args = t.render_args(&TemplateContext::for_pkg("a/b")).unwrap();
        assert_eq!(args, vec!["-c", "go test a/b && go install a/b"]);
    }

    #[cfg(unix)]
    #[test]
    fn shell_template_quotes_package_with_metacharacters() {
        let t = CommandTemplate::shell("go test ./{pkg}").unwrap();
        let args = t.render_args(&TemplateContext::for_pkg("a b;rm -rf x")).unwrap();
        assert_eq!(args, vec!["-c", "go test ./'a b;rm -rf x'"]);

        let args = t.render_args(&TemplateContext::for_pkg("it's")).unwrap();
        assert_eq!(args, vec!["-c", r"go test ./'it'\''s'"]);
    }

    #[test]
    fn argv_template_passes_package_verbatim() {
        let t = CommandTemplate::from_argv(&["go", "test", "{pkg}"]).unwrap();
        let args = t.render_args(&TemplateContext::for_pkg("a b;c")).unwrap();
        assert_eq!(args, vec!["test", "a b;c"]);
    }
}
