//! System instructions and prompt builders for each entry point.

use std::collections::BTreeMap;

/// Instruction for terminal questions; the model may suggest one shell command.
pub const TERMINAL_INSTRUCTION: &str = r#"You are Gema, an assistant that lives in the user's terminal.

## How to Answer
- Reply with a JSON object: "response" holds your answer, "command" optionally holds ONE shell command that accomplishes what was asked.
- Leave "command" empty when no command is needed or when you are not confident it is correct for this machine.
- The command will only run after the user confirms it, and it runs through a POSIX shell (cmd on Windows).
- Prefer read-only, non-destructive commands. Never chain destructive steps.

## What You Know
- System information about this machine may be included above. Use it to pick commands that fit the OS and tools available.
- Do not repeat the system information in your answer unless the user asks about it directly.

## Who You Are Talking To
- The user is comfortable with shell scripting and terminal usage. Skip the basics and be concise.
"#;

/// Instruction for the screen assistant, which always receives a screenshot.
pub const SCREEN_ASSISTANT_INSTRUCTION: &str = r#"You are Gema, an assistant that can see the user's screen.

A screenshot of the user's primary display is attached to the question.
- Interpret what is visible: UI elements, code, error messages, diagrams.
- Answer the question about what is on screen, suggest fixes for problems you can see, and explain unfamiliar elements.
- Your answer will be read aloud, so write plain sentences without markdown, tables or code fences.
- Reply with a JSON object whose "response" field holds the answer. Put a shell command in "command" only if the user asked for one.
- System information may be included above; only mention it when it helps solve the problem.
"#;

/// Instruction for text revision and commit messages, where only the text matters.
pub const PLAIN_TEXT_INSTRUCTION: &str = r#"You are Gema, a precise writing assistant.
Reply with a JSON object whose "response" field contains only the requested text, with no preamble or commentary. Leave "command" empty.
"#;

/// Instruction for the browser chat. Commands are never shown there.
pub const WEB_CHAT_INSTRUCTION: &str = r#"You are Gema, a helpful assistant answering in a browser chat.
Reply with a JSON object whose "response" field holds your answer. Markdown is fine. Leave "command" empty.
"#;

/// Default instruction for commit message generation.
pub const DEFAULT_COMMIT_PROMPT: &str =
    "Generate a commit message in present tense and less than 50 words for the following changes:";

/// Prompt asking the model to make `text` more professional.
///
/// Recognized inline tags: `[length=X]` for a target word count and
/// `[type=email]` for email formatting.
pub fn writer_prompt(text: &str) -> String {
    format!(
        r#"Please revise the following text to be more professional. Maintain the original length as closely as possible, unless a length constraint or output type is specified.

**Input Text:**
{text}

**Instructions:**

- **Default Behavior:** If no explicit instructions are provided, keep the original length (a few words longer or shorter is fine) while making it sound more professional.
- **Length Constraint:** If [length=X] is present (where X is a number), make the output approximately X words long.
- **Output Type:** If [type=email] is present, format the output as a professional email with a subject line, a greeting and a closing.
- **Professionalism:** Aim for clarity, concise wording, proper grammar and a tone suited to business communication. Avoid slang and overly informal language.

**Example Usage:**

- **Basic:** "Hey, wanna chat later?" becomes something like "Would you be available to connect later?"
- **With Length Constraint:** "This is a really long message that talks about a lot of stuff." [length=50] becomes a refined version of about 50 words.
- **Email Format:** "Hi, can we talk about this important thing? Thx." [type=email] becomes a complete email.

Return only the improved text."#
    )
}

/// Prompt for a commit message from the changed files and (already truncated) diff.
pub fn commit_prompt(custom: Option<&str>, files: &[String], diff: &str) -> String {
    let instruction = custom
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_COMMIT_PROMPT);
    format!(
        "{}\n\nChanged files:\n{}\n\nDiff:\n{}",
        instruction,
        files.join("\n"),
        diff
    )
}

/// Query for the web chat: prior turns (ordered by question) then the new message.
pub fn web_query(message: &str, history: &BTreeMap<String, String>) -> String {
    let mut formatted_history = String::new();
    if !history.is_empty() {
        formatted_history.push_str("Previous conversation:\n");
        for (question, answer) in history {
            formatted_history.push_str(&format!("Question: {}\nAnswer: {}\n\n", question, answer));
        }
    }
    format!(
        "You are an AI assistant. {}New question: {}",
        formatted_history, message
    )
}
