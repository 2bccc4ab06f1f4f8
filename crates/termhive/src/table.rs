use termhive_core::SessionInfo;

pub struct TableFormatter {
    id_width: usize,
    project_width: usize,
    worktree_width: usize,
    kind_width: usize,
    state_width: usize,
    mode_width: usize,
    activity_width: usize,
    title_width: usize,
}

impl TableFormatter {
    pub fn new(sessions: &[SessionInfo]) -> Self {
        let project_width = sessions
            .iter()
            .map(|s| s.project_id.chars().count())
            .max()
            .unwrap_or(7)
            .clamp(7, 30);
        let worktree_width = sessions
            .iter()
            .filter_map(|s| s.worktree_id.as_ref().map(|w| w.chars().count()))
            .max()
            .unwrap_or(8)
            .clamp(8, 30);

        Self {
            id_width: 8,
            project_width,
            worktree_width,
            kind_width: 5,
            state_width: 10,
            mode_width: 14,
            activity_width: 19,
            title_width: 30,
        }
    }

    pub fn print_table(&self, sessions: &[SessionInfo]) {
        println!("{}", self.border('┌', '┬', '┐'));
        println!(
            "{}",
            self.row(["Id", "Project", "Worktree", "Kind", "State", "Mode", "Activity", "Title"])
        );
        println!("{}", self.border('├', '┼', '┤'));
        for session in sessions {
            self.print_row(session);
        }
        println!("{}", self.border('└', '┴', '┘'));
    }

    fn print_row(&self, session: &SessionInfo) {
        let kind = match session.kind {
            termhive_core::SessionKind::InteractiveAgent => "agent",
            termhive_core::SessionKind::PlainShell => "shell",
        };
        let activity = session
            .last_activity
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        println!(
            "{}",
            self.row([
                &short_id(&session.id),
                &session.project_id,
                session.worktree_id.as_deref().unwrap_or("-"),
                kind,
                session.state.as_str(),
                &mode(session),
                &activity,
                &session.title,
            ])
        );
    }

    fn widths(&self) -> [usize; 8] {
        [
            self.id_width,
            self.project_width,
            self.worktree_width,
            self.kind_width,
            self.state_width,
            self.mode_width,
            self.activity_width,
            self.title_width,
        ]
    }

    fn row(&self, cells: [&str; 8]) -> String {
        let cells: Vec<String> = cells
            .iter()
            .zip(self.widths())
            .map(|(cell, width)| truncate(cell, width))
            .collect();
        format!("│ {} │", cells.join(" │ "))
    }

    fn border(&self, left: char, mid: char, right: char) -> String {
        let segments: Vec<String> = self
            .widths()
            .iter()
            .map(|w| "─".repeat(w + 2))
            .collect();
        format!("{}{}{}", left, segments.join(&mid.to_string()), right)
    }
}

/// First eight characters of a session id.
pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// "live", or "dormant" with the buffered byte count.
pub fn mode(session: &SessionInfo) -> String {
    if session.dormant {
        format!("dormant({})", human_bytes(session.buffered_bytes))
    } else {
        "live".to_string()
    }
}

pub fn human_bytes(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB {
        format!("{:.1}M", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1}K", bytes as f64 / KIB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Truncate a string to a maximum display width, adding "..." if truncated.
///
/// Uses character count (not byte count) to safely handle UTF-8 strings
/// including emoji and multi-byte characters.
pub fn truncate(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        format!("{:<width$}", s, width = max_len)
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{:<width$}", format!("{}...", truncated), width = max_len)
    }
}
