//! Compiler options the analyzer consumes from the toolchain driver.

/// Optimization levels, `s0` (none) through `s3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptLevel {
    /// No optimization.
    S0,
    /// Basic cleanup.
    S1,
    /// Standard.
    S2,
    /// Aggressive.
    S3,
}

impl OptLevel {
    /// Parse an `s0..s3` flag value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "s0" => Some(OptLevel::S0),
            "s1" => Some(OptLevel::S1),
            "s2" => Some(OptLevel::S2),
            "s3" => Some(OptLevel::S3),
            _ => None,
        }
    }
}

/// What the compile produces; entry-point rules differ per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetKind {
    /// An executable; exactly one `Main(args)` required.
    #[default]
    Executable,
    /// A shared library; entry points are forbidden.
    Library,
    /// A web handler; exactly one `Action(req, res)` required.
    Web,
}

/// Parsed driver options.
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    /// Source file path.
    pub file: Option<String>,
    /// Inline source text, `-inline`.
    pub inline_source: Option<String>,
    /// Library paths, `-lib a,b,c`.
    pub libraries: Vec<String>,
    /// Optimization level, `-opt s0..s3`.
    pub opt_level: Option<OptLevel>,
    /// Exit on first error batch, `-exit`.
    pub exit_on_error: bool,
    /// Build target.
    pub target: TargetKind,
}

impl CompilerOptions {
    /// Parse a driver argument list.
    ///
    /// Unknown flags and missing flag values are errors; the message names
    /// the offending flag.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut options = CompilerOptions::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-file" => {
                    let value = iter.next().ok_or("-file requires a path")?;
                    options.file = Some(value.clone());
                }
                "-inline" => {
                    let value = iter.next().ok_or("-inline requires source text")?;
                    options.inline_source = Some(value.clone());
                }
                "-lib" => {
                    let value = iter.next().ok_or("-lib requires a path list")?;
                    options
                        .libraries
                        .extend(value.split(',').filter(|s| !s.is_empty()).map(String::from));
                }
                "-opt" => {
                    let value = iter.next().ok_or("-opt requires a level")?;
                    options.opt_level =
                        Some(OptLevel::parse(value).ok_or_else(|| {
                            format!("invalid optimization level '{value}' (expected s0..s3)")
                        })?);
                }
                "-exit" => options.exit_on_error = true,
                "-web" => options.target = TargetKind::Web,
                "-tar" => {
                    let value = iter.next().ok_or("-tar requires a target")?;
                    options.target = match value.as_str() {
                        "exe" => TargetKind::Executable,
                        "lib" => TargetKind::Library,
                        "web" => TargetKind::Web,
                        other => return Err(format!("invalid target '{other}'")),
                    };
                }
                other => return Err(format!("unknown flag '{other}'")),
            }
        }

        if options.file.is_none() && options.inline_source.is_none() {
            return Err("no input: pass -file or -inline".to_string());
        }

        Ok(options)
    }

    /// Convenience: library-build options for a source file.
    pub fn library(file: &str) -> Self {
        Self {
            file: Some(file.to_string()),
            target: TargetKind::Library,
            ..Default::default()
        }
    }

    /// Convenience: executable-build options for a source file.
    pub fn executable(file: &str) -> Self {
        Self {
            file: Some(file.to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_full_line() {
        let options = CompilerOptions::parse(&args(&[
            "-file", "prog.vl", "-lib", "collect,net", "-opt", "s2", "-exit",
        ]))
        .unwrap();

        assert_eq!(options.file.as_deref(), Some("prog.vl"));
        assert_eq!(options.libraries, vec!["collect", "net"]);
        assert_eq!(options.opt_level, Some(OptLevel::S2));
        assert!(options.exit_on_error);
        assert_eq!(options.target, TargetKind::Executable);
    }

    #[test]
    fn test_parse_rejects_bad_opt() {
        let err = CompilerOptions::parse(&args(&["-file", "p.vl", "-opt", "s9"])).unwrap_err();
        assert!(err.contains("s9"));
    }

    #[test]
    fn test_parse_requires_input() {
        assert!(CompilerOptions::parse(&args(&["-exit"])).is_err());
    }

    #[test]
    fn test_inline_source_accepted() {
        let options = CompilerOptions::parse(&args(&["-inline", "class A {}"])).unwrap();
        assert!(options.inline_source.is_some());
    }
}
