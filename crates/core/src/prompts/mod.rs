//! Prompt assembly. Pure string building, no I/O.

use crate::model::LengthOption;

const PREVIOUS_HEADER: &str = "[Chapter so far]";
const NOVEL_HEADER: &str = "[Novel settings]";
const CHAPTER_HEADER: &str = "[Chapter arc]";
const PLOT_HEADER: &str = "[Scene plot]";
const GUIDELINES_HEADER: &str = "[Guidelines]";
const BEGIN_HEADER: &str = "[Begin writing the scene below]";

const FIRST_SCENE_INSTRUCTION: &str =
    "Write the opening scene of this chapter using the material below.";
const CONTINUATION_INSTRUCTION: &str = "Continue the chapter directly from where the text above \
ends, using the material below. Do not repeat or summarize what has already been written.";
const FREE_PLOT: &str =
    "No specific plot was given. Proceed freely in a direction that fits the story so far.";

const FIRST_SCENE_GUIDELINES: [&str; 3] = [
    "Open with a concrete moment that grounds the reader in place and point of view.",
    "Introduce characters through action and dialogue rather than exposition.",
    "End on a beat that makes the reader want the next scene.",
];
const CONTINUATION_GUIDELINES: [&str; 3] = [
    "Keep tone, tense and point of view consistent with the previous text.",
    "Advance the plot; do not restate events that already happened.",
    "End on a beat that makes the reader want the next scene.",
];

const SUMMARY_INSTRUCTION: &str = "Summarize the novel below. Cover the main plot developments \
chapter by chapter, the current situation of every major character, and any unresolved \
threads. Write the summary as plain prose without headings.";

/// Inputs for one scene prompt. Blank fields are omitted from the output.
#[derive(Clone, Copy, Debug)]
pub struct PromptInputs<'a> {
    pub novel_settings: &'a str,
    pub chapter_arc_notes: &'a str,
    pub scene_plot: &'a str,
    pub length: LengthOption,
    pub previous_content: &'a str,
}

fn block(header: &str, body: &str) -> String {
    format!("{header}\n{body}")
}

fn guideline_block(length: LengthOption, lines: &[&str]) -> String {
    let mut body = format!("- Target length: {}.", length.describe());
    for line in lines {
        body.push_str("\n- ");
        body.push_str(line);
    }
    block(GUIDELINES_HEADER, &body)
}

/// Builds the user prompt in a fixed block order: previous content,
/// instruction, novel settings, chapter arc, scene plot, guidelines, begin
/// header. Blocks are separated by one blank line.
pub fn build_prompt(inputs: &PromptInputs<'_>) -> String {
    let previous = inputs.previous_content.trim();
    let continuation = !previous.is_empty();
    let mut blocks: Vec<String> = Vec::with_capacity(7);

    if continuation {
        blocks.push(block(PREVIOUS_HEADER, previous));
        blocks.push(CONTINUATION_INSTRUCTION.to_string());
    } else {
        blocks.push(FIRST_SCENE_INSTRUCTION.to_string());
    }

    let novel = inputs.novel_settings.trim();
    if !novel.is_empty() {
        blocks.push(block(NOVEL_HEADER, novel));
    }

    let arc = inputs.chapter_arc_notes.trim();
    if !arc.is_empty() {
        blocks.push(block(CHAPTER_HEADER, arc));
    }

    let plot = inputs.scene_plot.trim();
    blocks.push(block(PLOT_HEADER, if plot.is_empty() { FREE_PLOT } else { plot }));

    if continuation {
        blocks.push(guideline_block(inputs.length, &CONTINUATION_GUIDELINES));
    } else {
        blocks.push(guideline_block(inputs.length, &FIRST_SCENE_GUIDELINES));
    }

    blocks.push(BEGIN_HEADER.to_string());
    blocks.join("\n\n")
}

pub fn build_summary_prompt(novel_content: &str) -> String {
    format!("{SUMMARY_INSTRUCTION}\n\n{}", novel_content.trim())
}
