//! Subcommand handlers. Each one borrows the shared [`AppContext`].

use crate::web;
use crate::AppContext;
use agent_host::prompts::{
    commit_prompt, writer_prompt, PLAIN_TEXT_INSTRUCTION, TERMINAL_INSTRUCTION,
};
use agent_host::{confirm, Assistant, Session, ShellRunner, Spinner};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use providers::Backend;
use services::git::{limit_diff, GitRepo, MAX_DIFF_BYTES};
use shared::agent_api::{AskOptions, Query};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub async fn ask(ctx: &AppContext, words: &[String]) -> Result<()> {
    let options = AskOptions::new(TERMINAL_INSTRUCTION)
        .with_system_context(!ctx.settings.skip_system_context);
    let session = Session::new(ctx.backend.clone(), Arc::new(ShellRunner), options);

    let mut input = io::stdin().lock();
    let outcome = session
        .run(Query::new(words.join(" ")), &mut input, &mut io::stdout())
        .await?;
    tracing::debug!("Session finished: {:?}", outcome);
    Ok(())
}

/// Revise `text` and print the result. Returns the revision.
pub async fn writer<W>(backend: &dyn Backend, text: &str, out: &mut W) -> Result<String>
where
    W: Write + ?Sized,
{
    writeln!(out, "{}", "Processing your text with Gemini AI...".yellow())?;

    let options = AskOptions::new(PLAIN_TEXT_INSTRUCTION).with_system_context(false);
    let spinner = Spinner::start("Revising...");
    let result = backend.ask(&Query::new(writer_prompt(text)), &options).await;
    spinner.stop();

    let revised = result?.response.trim().to_string();
    writeln!(out, "{}\n", "✓ Professional revision complete:".green().bold())?;
    writeln!(out, "{}", revised)?;
    Ok(revised)
}

const COMMIT_TOKEN: &str = "yes";

#[derive(Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    NoChanges,
    Aborted { message: String },
    Committed { message: String, id: String },
}

/// Generate a commit message for the repository at `path` and commit only if
/// the user answers exactly `yes`.
pub async fn commit<R, W>(
    backend: &dyn Backend,
    path: &Path,
    prompt: Option<&str>,
    input: &mut R,
    out: &mut W,
) -> Result<CommitOutcome>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    let repo = GitRepo::open(path)?;
    if !repo.has_uncommitted_changes()? {
        writeln!(
            out,
            "{}",
            format!(
                "There are no uncommitted changes in the repository at {}.",
                path.display()
            )
            .yellow()
        )?;
        return Ok(CommitOutcome::NoChanges);
    }

    let files = repo.changed_files()?;
    let diff = limit_diff(&repo.diff_text()?, MAX_DIFF_BYTES);
    let query = Query::new(commit_prompt(prompt, &files, &diff));
    let options = AskOptions::new(PLAIN_TEXT_INSTRUCTION).with_system_context(false);

    let spinner = Spinner::start("Writing commit message...");
    let result = backend.ask(&query, &options).await;
    spinner.stop();
    let message = result?.response.trim().to_string();

    writeln!(out, "{}", format!("Commit message: {}", message).green())?;
    writeln!(out, "{}", "Files to be committed:".blue())?;
    for file in &files {
        writeln!(out, "  - {}", file)?;
    }

    let prompt = "Do you want to commit these changes? (yes/no): ".cyan().to_string();
    if !confirm(input, out, &prompt, COMMIT_TOKEN) {
        writeln!(out, "{}", "Commit aborted.".yellow())?;
        return Ok(CommitOutcome::Aborted { message });
    }

    let id = repo.commit_all(&message)?;
    tracing::info!("Created commit {}", id);
    writeln!(out, "{}", "Changes have been committed.".green())?;
    Ok(CommitOutcome::Committed { message, id })
}

pub async fn commit_here(ctx: &AppContext, path: Option<PathBuf>, prompt: Option<&str>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => std::env::current_dir().context("failed to get current directory")?,
    };
    let mut input = io::stdin().lock();
    commit(ctx.backend.as_ref(), &path, prompt, &mut input, &mut io::stdout()).await?;
    Ok(())
}

pub async fn assist(ctx: &AppContext, words: &[String]) -> Result<()> {
    let assistant = Assistant::new(
        ctx.backend.clone(),
        ctx.platform.clone(),
        !ctx.settings.skip_system_context,
    );
    let mut out = io::stdout();
    if !words.is_empty() {
        assistant.turn(&words.join(" "), &mut out).await?;
        return Ok(());
    }

    writeln!(
        out,
        "{}",
        "Gema assistant is ready. Ask about your screen; an empty line quits.".yellow()
    )?;
    let stdin = io::stdin();
    let turns = assist_loop(&assistant, &mut stdin.lock(), &mut out).await?;
    tracing::debug!("Assistant answered {} questions", turns);
    Ok(())
}

/// Answer questions read from `input` until an empty line or EOF.
pub async fn assist_loop<R, W>(assistant: &Assistant, input: &mut R, out: &mut W) -> Result<usize>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    let mut turns = 0;
    loop {
        write!(out, "{} ", "What would you like help with?".bold())?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            break;
        }
        assistant.turn(question, out).await?;
        turns += 1;
    }
    Ok(turns)
}

pub async fn web(ctx: &AppContext, no_open: bool) -> Result<()> {
    let server = web::bind(ctx.settings.port)?;
    let browser = (!no_open).then(|| ctx.platform.clone());
    web::serve(server, ctx.backend.clone(), browser).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use git2::Repository;
    use parking_lot::Mutex;
    use services::{Platform, SpeechHandle};
    use shared::agent_api::AiResponse;
    use shared::BackendError;
    use std::io::Cursor;
    use tempfile::TempDir;

    struct StubBackend {
        response: String,
        queries: Mutex<Vec<String>>,
    }

    impl StubBackend {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Backend for StubBackend {
        async fn ask(&self, query: &Query, _options: &AskOptions) -> Result<AiResponse, BackendError> {
            self.queries.lock().push(query.text.clone());
            Ok(AiResponse {
                response: self.response.clone(),
                command: String::new(),
            })
        }
    }

    fn repo_with_change() -> TempDir {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        std::fs::write(dir.path().join("notes.md"), "# Notes\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_writer_trims_and_prints() {
        let backend = StubBackend::new("  Would you be available to connect later?\n");
        let mut out = Vec::new();
        let revised = writer(&backend, "wanna chat later? [length=10]", &mut out)
            .await
            .unwrap();
        assert_eq!(revised, "Would you be available to connect later?");
        assert!(backend.queries.lock()[0].contains("wanna chat later? [length=10]"));
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Professional revision complete:"));
        assert!(out.ends_with("Would you be available to connect later?\n"));
    }

    #[tokio::test]
    async fn test_commit_confirmed() {
        let dir = repo_with_change();
        let backend = StubBackend::new("Add notes file\n");
        let mut out = Vec::new();
        let outcome = commit(
            &backend,
            dir.path(),
            None,
            &mut Cursor::new("yes\n"),
            &mut out,
        )
        .await
        .unwrap();

        match outcome {
            CommitOutcome::Committed { message, id } => {
                assert_eq!(message, "Add notes file");
                assert_eq!(id.len(), 40);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let query = backend.queries.lock()[0].clone();
        assert!(query.contains("Changed files:\nnotes.md"));
        assert!(query.contains("+# Notes"));
        assert!(!GitRepo::open(dir.path()).unwrap().has_uncommitted_changes().unwrap());

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("  - notes.md"));
    }

    #[tokio::test]
    async fn test_commit_declined_keeps_changes() {
        let dir = repo_with_change();
        let backend = StubBackend::new("Add notes file");
        let outcome = commit(
            &backend,
            dir.path(),
            Some("Use conventional commits."),
            &mut Cursor::new("y\n"),
            &mut Vec::<u8>::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            CommitOutcome::Aborted {
                message: "Add notes file".into()
            }
        );
        assert!(backend.queries.lock()[0].starts_with("Use conventional commits."));
        assert!(GitRepo::open(dir.path()).unwrap().has_uncommitted_changes().unwrap());
    }

    #[tokio::test]
    async fn test_commit_needs_exact_yes() {
        let dir = repo_with_change();
        for answer in ["YES\n", "Yes\n", "y\n", ""] {
            let backend = StubBackend::new("Add notes file");
            let outcome = commit(
                &backend,
                dir.path(),
                None,
                &mut Cursor::new(answer),
                &mut Vec::<u8>::new(),
            )
            .await
            .unwrap();
            assert!(
                matches!(outcome, CommitOutcome::Aborted { .. }),
                "{:?} should not commit",
                answer
            );
        }
        assert!(GitRepo::open(dir.path()).unwrap().has_uncommitted_changes().unwrap());
    }

    #[tokio::test]
    async fn test_commit_without_changes_skips_backend() {
        let dir = TempDir::new().unwrap();
        Repository::init(dir.path()).unwrap();
        let backend = StubBackend::new("unused");
        let mut out = Vec::new();
        let outcome = commit(&backend, dir.path(), None, &mut Cursor::new(""), &mut out)
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::NoChanges);
        assert!(backend.queries.lock().is_empty());
        assert!(String::from_utf8(out)
            .unwrap()
            .contains("There are no uncommitted changes"));
    }

    #[tokio::test]
    async fn test_commit_rejects_plain_directory() {
        let dir = TempDir::new().unwrap();
        let backend = StubBackend::new("unused");
        let err = commit(&backend, dir.path(), None, &mut Cursor::new(""), &mut Vec::<u8>::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a git repository"));
    }

    struct QuietPlatform;

    impl Platform for QuietPlatform {
        fn name(&self) -> &'static str {
            "quiet"
        }

        fn speak(&self, _text: &str) -> Result<SpeechHandle> {
            Err(anyhow!("no speech here"))
        }

        fn copy_to_clipboard(&self, _text: &str) -> Result<()> {
            Ok(())
        }

        fn capture_screen(&self) -> Result<Vec<u8>> {
            Err(anyhow!("no display"))
        }
    }

    #[tokio::test]
    async fn test_assist_loop_stops_on_empty_line() {
        let backend = Arc::new(StubBackend::new("Click the blue button."));
        let assistant = Assistant::new(backend.clone(), Arc::new(QuietPlatform), false);
        let mut out = Vec::new();
        let turns = assist_loop(
            &assistant,
            &mut Cursor::new("what is this?\nand that?\n\nignored\n"),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(turns, 2);
        assert_eq!(backend.queries.lock().len(), 2);
        assert!(String::from_utf8(out).unwrap().contains("Click the blue button."));
    }
}
