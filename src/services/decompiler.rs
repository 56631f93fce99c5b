use crate::services::process::{isolate_process_group, kill_process_tree};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Placeholder replaced with the mod archive path
pub const PATH_TO_JAR: &str = "path_to_jar";

/// Placeholder replaced with the output folder
pub const OUT_PATH: &str = "out_path";

/// Most error lines kept from decompiler output
const MAX_CAPTURED_LINES: usize = 20;

/// How long to wait for output readers once the process has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Escaped braces, a `{name}` placeholder, or a lone brace
static TEMPLATE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").expect("Invalid template regex")
});

/// Errors in a decompiler command template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("Empty placeholder {{}} at position {0}")]
    EmptyPlaceholder(usize),

    #[error("Unmatched '{brace}' at position {position}")]
    UnmatchedBrace { brace: char, position: usize },

    #[error("Missing placeholder {{{0}}}")]
    MissingPlaceholder(&'static str),
}

/// Errors that fail the decompiler check
#[derive(Error, Debug)]
pub enum DecompilerError {
    #[error("Invalid decompiler command: {0}")]
    Template(#[from] TemplateError),

    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to inspect decompiler output folder {path}: {source}")]
    OutputCheck {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decompiler produced no output in {out_path} ({exit_status})")]
    NoOutput {
        out_path: Utf8PathBuf,
        exit_status: String,
        captured: Vec<String>,
    },

    #[error("Decompiler did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Decompiler check cancelled")]
    Cancelled,
}

/// A parsed decompiler command template
///
/// Uses brace formatting: `{path_to_jar}` and `{out_path}` are substituted,
/// `{{` and `}}` produce literal braces. Both placeholders must be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompilerCommand {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    JarPath,
    OutPath,
}

impl DecompilerCommand {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;
        let (mut has_jar, mut has_out) = (false, false);

        for caps in TEMPLATE_TOKEN_RE.captures_iter(template) {
            let whole = caps.get(0).expect("capture group 0 always matches");
            literal.push_str(&template[last..whole.start()]);
            last = whole.end();

            let placeholder = match whole.as_str() {
                "{{" => {
                    literal.push('{');
                    continue;
                }
                "}}" => {
                    literal.push('}');
                    continue;
                }
                "{" | "}" => {
                    return Err(TemplateError::UnmatchedBrace {
                        brace: whole.as_str().chars().next().unwrap_or('{'),
                        position: whole.start(),
                    });
                }
                _ => match caps.get(1).map(|m| m.as_str()) {
                    Some("") | None => return Err(TemplateError::EmptyPlaceholder(whole.start())),
                    Some(PATH_TO_JAR) => {
                        has_jar = true;
                        Segment::JarPath
                    }
                    Some(OUT_PATH) => {
                        has_out = true;
                        Segment::OutPath
                    }
                    Some(other) => return Err(TemplateError::UnknownPlaceholder(other.to_string())),
                },
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(placeholder);
        }

        literal.push_str(&template[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !has_jar {
            return Err(TemplateError::MissingPlaceholder(PATH_TO_JAR));
        }
        if !has_out {
            return Err(TemplateError::MissingPlaceholder(OUT_PATH));
        }

        Ok(Self { segments })
    }

    /// Substitute the placeholders verbatim.
    pub fn format(&self, path_to_jar: &Utf8Path, out_path: &Utf8Path) -> String {
        let mut command = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => command.push_str(text),
                Segment::JarPath => command.push_str(path_to_jar.as_str()),
                Segment::OutPath => command.push_str(out_path.as_str()),
            }
        }
        command
    }
}

/// Parse `template` and substitute both placeholders.
pub fn format_command(
    template: &str,
    path_to_jar: &Utf8Path,
    out_path: &Utf8Path,
) -> Result<String, TemplateError> {
    Ok(DecompilerCommand::parse(template)?.format(path_to_jar, out_path))
}

/// Scans decompiler output for lines that look like failures
#[derive(Debug, Clone)]
pub struct OutputAnalyser {
    error_pattern: Regex,
}

impl OutputAnalyser {
    pub fn new() -> Self {
        Self {
            error_pattern: Regex::new(r"(?i)exception|error|not found|unable to access|no such file")
                .expect("Invalid error regex"),
        }
    }

    pub fn is_error_line(&self, line: &str) -> bool {
        self.error_pattern.is_match(line)
    }

    /// Read `reader` line by line, logging each line and keeping the last error lines.
    pub async fn analyse<R>(self, reader: R, stream: &'static str) -> Vec<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        let mut captured = Vec::new();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Stopped reading decompiler {}: {}", stream, e);
                    break;
                }
            };

            if stream == "stderr" {
                tracing::warn!(target: "decompiler", "[{}] {}", stream, line);
            } else {
                tracing::debug!(target: "decompiler", "[{}] {}", stream, line);
            }

            if self.is_error_line(&line) {
                if captured.len() == MAX_CAPTURED_LINES {
                    captured.remove(0);
                }
                captured.push(line);
            }
        }

        captured
    }
}

impl Default for OutputAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

/// Pid of the decompiler currently running, shared with whoever may terminate it
#[derive(Debug, Default)]
pub struct RunningProcess {
    pid: Mutex<Option<u32>>,
}

impl RunningProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pid: u32) {
        *self.pid.lock().unwrap_or_else(PoisonError::into_inner) = Some(pid);
    }

    pub fn clear(&self) {
        *self.pid.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Kill the registered process tree, if any. Returns whether one was registered.
    pub fn kill(&self) -> std::io::Result<bool> {
        let pid = self.pid.lock().unwrap_or_else(PoisonError::into_inner).take();
        match pid {
            Some(pid) => {
                kill_process_tree(pid)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Result of a successful decompiler check
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub command: String,
    pub exit_code: Option<i32>,
    pub output_entries: usize,
    pub duration: Duration,
    pub captured: Vec<String>,
}

/// Runs the user's decompiler command against the fixture mod
pub struct DecompilerValidator {
    analyser: OutputAnalyser,
    running: Arc<RunningProcess>,
}

impl DecompilerValidator {
    pub fn new(running: Arc<RunningProcess>) -> Self {
        Self {
            analyser: OutputAnalyser::new(),
            running,
        }
    }

    /// Format `template`, run it, and require at least one entry in `out_path`.
    ///
    /// The process is raced against `cancel` and `timeout_duration`; on either the
    /// whole process tree is killed.
    pub async fn validate(
        &self,
        template: &str,
        test_mod: &Utf8Path,
        out_path: &Utf8Path,
        timeout_duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<ValidationReport, DecompilerError> {
        let command = format_command(template, test_mod, out_path)?;
        tracing::info!("Executing: {}", command);

        let start = Instant::now();
        let (status, captured) = self.run(&command, timeout_duration, cancel).await?;
        let duration = start.elapsed();

        let output_entries = count_entries(out_path)?;
        tracing::info!(
            "Decompiler check finished in {:.2}s with {}, {} output entries",
            duration.as_secs_f32(),
            status,
            output_entries
        );

        if output_entries == 0 {
            return Err(DecompilerError::NoOutput {
                out_path: out_path.to_path_buf(),
                exit_status: status.to_string(),
                captured,
            });
        }

        Ok(ValidationReport {
            command,
            exit_code: status.code(),
            output_entries,
            duration,
            captured,
        })
    }

    async fn run(
        &self,
        command: &str,
        timeout_duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(ExitStatus, Vec<String>), DecompilerError> {
        let mut cmd = shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| DecompilerError::Launch {
            command: command.to_string(),
            source,
        })?;

        if let Some(pid) = child.id() {
            self.running.register(pid);
        }

        let readers = [
            child
                .stdout
                .take()
                .map(|out| tokio::spawn(self.analyser.clone().analyse(out, "stdout"))),
            child
                .stderr
                .take()
                .map(|err| tokio::spawn(self.analyser.clone().analyse(err, "stderr"))),
        ];

        let waited = tokio::select! {
            // Terminate cancels and kills together, so the exit can win the race.
            // It still counts as a cancellation.
            status = child.wait() => {
                if cancel.is_cancelled() {
                    Err(DecompilerError::Cancelled)
                } else {
                    Ok(status)
                }
            }
            _ = cancel.cancelled() => Err(DecompilerError::Cancelled),
            _ = tokio::time::sleep(timeout_duration) => {
                tracing::warn!("Decompiler timed out after {:?}", timeout_duration);
                Err(DecompilerError::Timeout(timeout_duration))
            }
        };

        let status = match waited {
            Ok(status) => status.map_err(|source| DecompilerError::Launch {
                command: command.to_string(),
                source,
            }),
            Err(e) => {
                if let Err(kill_err) = self.running.kill() {
                    tracing::warn!("Failed to kill decompiler process tree: {}", kill_err);
                }
                let _ = child.kill().await;
                Err(e)
            }
        };
        self.running.clear();

        let captured = drain_readers(readers).await;
        status.map(|status| (status, captured))
    }
}

/// Run `command` through the platform shell, passed on exactly as written.
fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        // `args` would re-quote the line with `\"` escapes, which cmd.exe does not understand.
        let mut cmd = Command::new("cmd");
        cmd.raw_arg("/C").raw_arg(command);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

async fn drain_readers(readers: [Option<JoinHandle<Vec<String>>>; 2]) -> Vec<String> {
    let mut captured = Vec::new();
    for handle in readers.into_iter().flatten() {
        let abort = handle.abort_handle();
        match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, handle).await {
            Ok(Ok(lines)) => captured.extend(lines),
            Ok(Err(e)) => tracing::debug!("Output reader failed: {}", e),
            Err(_) => {
                tracing::debug!("Output reader still open after process exit, abandoning it");
                abort.abort();
            }
        }
    }
    captured
}

fn count_entries(path: &Utf8Path) -> Result<usize, DecompilerError> {
    let entries = std::fs::read_dir(path).map_err(|source| DecompilerError::OutputCheck {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(entries.count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_substitutes_both_placeholders() {
        let cmd = format_command(
            "java -jar cfr.jar {path_to_jar} --outputdir {out_path}",
            Utf8Path::new("/mods/test.jar"),
            Utf8Path::new("/tmp/out"),
        )
        .unwrap();
        assert_eq!(cmd, "java -jar cfr.jar /mods/test.jar --outputdir /tmp/out");
    }

    #[test]
    fn test_format_repeated_and_escaped() {
        let cmd = format_command(
            "tool {{literal}} {path_to_jar} {out_path} {out_path}",
            Utf8Path::new("a.jar"),
            Utf8Path::new("out"),
        )
        .unwrap();
        assert_eq!(cmd, "tool {literal} a.jar out out");
    }

    #[test]
    fn test_missing_out_path() {
        let err = DecompilerCommand::parse("java -jar cfr.jar {path_to_jar}").unwrap_err();
        assert_eq!(err, TemplateError::MissingPlaceholder(OUT_PATH));
    }

    #[test]
    fn test_missing_path_to_jar() {
        let err = DecompilerCommand::parse("java -jar cfr.jar {out_path}").unwrap_err();
        assert_eq!(err, TemplateError::MissingPlaceholder(PATH_TO_JAR));
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = DecompilerCommand::parse("{path_to_jar} {out_path} {jar}").unwrap_err();
        assert_eq!(err, TemplateError::UnknownPlaceholder("jar".to_string()));
    }

    #[test]
    fn test_empty_placeholder() {
        let err = DecompilerCommand::parse("{path_to_jar} {} {out_path}").unwrap_err();
        assert_eq!(err, TemplateError::EmptyPlaceholder(14));
    }

    #[test]
    fn test_unmatched_braces() {
        let err = DecompilerCommand::parse("{path_to_jar} {out_path").unwrap_err();
        assert_eq!(err, TemplateError::UnmatchedBrace { brace: '{', position: 14 });

        let err = DecompilerCommand::parse("{path_to_jar} out_path}").unwrap_err();
        assert_eq!(err, TemplateError::UnmatchedBrace { brace: '}', position: 22 });
    }

    #[test]
    fn test_analyser_error_lines() {
        let analyser = OutputAnalyser::new();
        assert!(analyser.is_error_line("Exception in thread \"main\" java.lang.NoClassDefFoundError"));
        assert!(analyser.is_error_line("Error: Unable to access jarfile cfr.jar"));
        assert!(analyser.is_error_line("sh: 1: cfr: not found"));
        assert!(!analyser.is_error_line("Processing net.minecraft.Foo"));
    }

    #[tokio::test]
    async fn test_analyse_keeps_last_error_lines() {
        let mut input = String::new();
        for i in 0..(MAX_CAPTURED_LINES + 5) {
            input.push_str(&format!("error {}\nok line\n", i));
        }

        let captured = OutputAnalyser::new().analyse(input.as_bytes(), "stdout").await;

        assert_eq!(captured.len(), MAX_CAPTURED_LINES);
        assert_eq!(captured[0], "error 5");
        assert_eq!(captured.last().unwrap(), &format!("error {}", MAX_CAPTURED_LINES + 4));
    }

    #[test]
    fn test_parse_reuses_compiled_pattern() {
        let first = DecompilerCommand::parse("a {path_to_jar} {out_path}").unwrap();
        let second = DecompilerCommand::parse("a {path_to_jar} {out_path}").unwrap();
        assert_eq!(first, second);
        assert_eq!(
            DecompilerCommand::parse("{path_to_jar} {out_path} }").unwrap_err(),
            TemplateError::UnmatchedBrace { brace: '}', position: 25 }
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn test_shell_command_passes_line_to_sh() {
        let cmd = shell_command("java -jar \"my tools/cfr.jar\" a.jar");
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "sh");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["-c", "java -jar \"my tools/cfr.jar\" a.jar"]);
    }

    #[cfg(windows)]
    #[test]
    fn test_shell_command_passes_line_to_cmd_verbatim() {
        let line = r#""C:\Program Files\Java\bin\java.exe" -jar cfr.jar a.jar --outputdir out"#;
        let cmd = shell_command(line);
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "cmd");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["/C", line]);
    }

    #[test]
    fn test_running_process_kill_without_pid() {
        let running = RunningProcess::new();
        assert!(!running.kill().unwrap());
        assert!(running.pid().is_none());
    }
}
