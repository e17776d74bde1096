//! Prompt assembly for agent generations

use std::fmt::Write as _;

use crate::types::{AgentRequest, ProjectSource};

/// System prompt for one generation
pub(super) fn system_prompt(projects: &[ProjectSource], request: &AgentRequest) -> String {
    let mut prompt = String::from(
        "You are a coding agent editing the user's project. All file paths are relative to \
         the project root. Use the file tools to read and change files and run diagnostics \
         before you finish.\n",
    );

    if request.is_plan_mode {
        prompt.push_str(
            "\nBefore changing any file, write a plan with the task_write tool and wait for \
             approval. Work through the tasks in order, marking each in_progress and then \
             completed.\n",
        );
    }

    if let Some(operation) = &request.operation_type {
        let _ = writeln!(prompt, "\nOperation: {operation}");
    }

    prompt.push_str("\nProjects:\n");
    for project in projects {
        let root = if project.relative_root.is_empty() {
            "."
        } else {
            project.relative_root.as_str()
        };
        let _ = writeln!(
            prompt,
            "- {} ({}, {} files)",
            project.project_name,
            root,
            project.files.len()
        );
    }
    prompt
}

/// User message for one generation
pub(super) fn user_prompt(projects: &[ProjectSource], request: &AgentRequest) -> String {
    let mut prompt = request.prompt.clone();

    if let Some(code) = &request.code_context {
        let _ = write!(prompt, "\n\n<code_context>\n{code}\n</code_context>");
    }

    for attachment in &request.file_attachments {
        let _ = write!(
            prompt,
            "\n\n<file_attachment name=\"{}\">\n{}\n</file_attachment>",
            attachment.file_name, attachment.content
        );
    }

    let files: Vec<&str> = projects
        .iter()
        .flat_map(|p| p.files.iter().map(String::as_str))
        .collect();
    if !files.is_empty() {
        let _ = write!(prompt, "\n\n<project_files>\n{}\n</project_files>", files.join("\n"));
    }
    prompt
}
