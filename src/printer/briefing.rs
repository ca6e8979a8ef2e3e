//! The mission briefing template and its ESC/POS framing.

use jiff::Zoned;

use crate::model::Mission;

const ESC_INIT: [u8; 2] = [0x1b, b'@'];
const FEED: [u8; 3] = [b'\n'; 3];
const PARTIAL_CUT: [u8; 4] = [0x1d, b'V', b'A', 0x10];

/// Render a mission as plain text, `width` columns wide, stamped with `at`.
pub fn format_briefing(mission: &Mission, agent: &str, width: usize, at: &Zoned) -> String {
    let rule = "=".repeat(width);
    let mut lines = vec![
        rule.clone(),
        center("MISSION BRIEFING", width),
        rule.clone(),
        String::new(),
    ];

    let mut push = |text: &str| lines.extend(wrap(text, width));
    push(&format!("AGENT: {agent}"));
    push(&format!("URGENCY: {}", mission.urgency));
    push(&format!("TIME: {}", at.strftime("%H:%M %d/%m/%Y")));
    push("");

    push("MISSION:");
    push(&mission.summary);
    push("");

    if !mission.people_involved.is_empty() {
        push("PEOPLE INVOLVED:");
        push(&mission.people_involved.join(", "));
        push("");
    }

    push("YOUR MISSION, SHOULD YOU");
    push("CHOOSE TO ACCEPT IT:");
    push(&mission.action);
    push("");

    if let Some(notice) = mission.urgency.self_destruct_notice() {
        push(&format!("*** {notice} ***"));
        push("");
    }

    push(&format!(
        "DEADLINE: {}",
        mission.deadline.as_deref().unwrap_or("ASAP")
    ));
    push("");

    lines.push(rule.clone());
    lines.extend(wrap(&format!("MISSION ID: {}", mission.mission_id), width));
    lines.push(rule);

    lines.join("\n")
}

/// Frame text for a thermal printer: initialise, text, feed, partial cut.
///
/// The printer's code page is single-byte, so non-ASCII characters print as `?`.
pub fn escpos_bytes(text: &str) -> Vec<u8> {
    let ascii: String = text
        .chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect();

    let mut bytes = Vec::with_capacity(ascii.len() + 9);
    bytes.extend_from_slice(&ESC_INIT);
    bytes.extend_from_slice(ascii.as_bytes());
    bytes.extend_from_slice(&FEED);
    bytes.extend_from_slice(&PARTIAL_CUT);
    bytes
}

fn center(text: &str, width: usize) -> String {
    format!("{text:^width$}").trim_end().to_string()
}

/// Greedy word wrap. Words longer than a line are split. An empty input
/// yields one empty line so blank spacers survive.
fn wrap(text: &str, width: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![String::new()];
    }

    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(width) {
                let chunk_len = chunk.len();
                let needed = if current_len == 0 {
                    chunk_len
                } else {
                    current_len + 1 + chunk_len
                };
                if needed > width {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(chunk);
                current_len += chunk_len;
            }
        }

        if current_len > 0 {
            lines.push(current);
        }
    }

    lines
}
