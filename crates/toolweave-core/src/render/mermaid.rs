//! Mermaid flowchart output

use std::collections::HashSet;
use std::fmt::{self, Write as _};

use crate::dag::{Dag, DagError, DagNode, NodeStatus};

const MAX_ID_LEN: usize = 100;
const TRUNCATED_SUFFIX: &str = "_etc";
const EMPTY_ID: &str = "_empty_";

/// Flow direction keyword
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MermaidDirection {
    /// Top to bottom
    #[default]
    TB,
    /// Top-down (alias of TB)
    TD,
    /// Bottom to top
    BT,
    /// Left to right
    LR,
    /// Right to left
    RL,
}

impl MermaidDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MermaidDirection::TB => "TB",
            MermaidDirection::TD => "TD",
            MermaidDirection::BT => "BT",
            MermaidDirection::LR => "LR",
            MermaidDirection::RL => "RL",
        }
    }

    /// Parse a direction keyword, case-insensitive
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TB" => Some(MermaidDirection::TB),
            "TD" => Some(MermaidDirection::TD),
            "BT" => Some(MermaidDirection::BT),
            "LR" => Some(MermaidDirection::LR),
            "RL" => Some(MermaidDirection::RL),
            _ => None,
        }
    }
}

impl fmt::Display for MermaidDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flowchart rendering options
#[derive(Debug, Clone, Default)]
pub struct MermaidOptions {
    pub direction: MermaidDirection,
    /// Emitted as a leading `%%` comment
    pub title: Option<String>,
    /// Add `classDef` lines and a status class per node
    pub with_styles: bool,
}

impl MermaidOptions {
    pub fn with_direction(mut self, direction: MermaidDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_styles(mut self) -> Self {
        self.with_styles = true;
        self
    }
}

fn class_def(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Pending => "fill:#f5f5f5,stroke:#999999,color:#333333",
        NodeStatus::Processing => "fill:#fff3cd,stroke:#d4a017,color:#333333",
        NodeStatus::Completed => "fill:#d4edda,stroke:#28a745,color:#155724",
        NodeStatus::Failed => "fill:#f8d7da,stroke:#dc3545,color:#721c24",
        NodeStatus::Skipped => "fill:#e2e3e5,stroke:#6c757d,color:#383d41,stroke-dasharray:4 2",
    }
}

/// Turn an arbitrary node id into a valid Mermaid identifier.
pub fn sanitize_mermaid_id(id: &str) -> String {
    if id.is_empty() {
        return EMPTY_ID.to_string();
    }

    let mut out = String::with_capacity(id.len() + 1);
    // Escapes always contribute an even number of underscores, so a lone
    // leading `_` cannot collide with any other encoded id.
    if id.starts_with(|c: char| c.is_ascii_digit()) {
        out.push('_');
    }
    for c in id.chars() {
        match c {
            c if c.is_ascii_alphanumeric() => out.push(c),
            '_' => out.push_str("__"),
            other => {
                let _ = write!(out, "_{:x}_", other as u32);
            }
        }
    }

    if out.len() > MAX_ID_LEN {
        out.truncate(MAX_ID_LEN - TRUNCATED_SUFFIX.len());
        out.push_str(TRUNCATED_SUFFIX);
    }
    out
}

/// Whether `id` can be used verbatim as a Mermaid node identifier.
pub fn validate_mermaid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with(|c: char| c.is_ascii_digit())
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Escape display text and wrap it in quotes.
pub fn escape_mermaid_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len() + 2);
    out.push('"');
    let mut chars = label.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("#quot;"),
            '<' => out.push_str("#lt;"),
            '>' => out.push_str("#gt;"),
            '&' => out.push_str("#amp;"),
            '[' => out.push_str("#91;"),
            ']' => out.push_str("#93;"),
            '(' => out.push_str("#40;"),
            ')' => out.push_str("#41;"),
            '{' => out.push_str("#123;"),
            '}' => out.push_str("#125;"),
            '|' => out.push_str("#124;"),
            '\\' => out.push_str("#92;"),
            '\n' => out.push_str("<br/>"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    out.push_str("<br/>");
                }
            }
            c if c.is_control() => {
                let _ = write!(out, "#{};", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl<T: DagNode> Dag<T> {
    /// Render a flowchart labelling nodes with [`DagNode::label`]
    pub fn mermaid_flowchart(&self, options: &MermaidOptions) -> Result<String, DagError> {
        self.mermaid_flowchart_with(options, |node| node.label())
    }

    /// Render a flowchart with a custom label function
    pub fn mermaid_flowchart_with<F>(
        &self,
        options: &MermaidOptions,
        label: F,
    ) -> Result<String, DagError>
    where
        F: Fn(&T) -> String,
    {
        if self.is_empty() {
            return Err(DagError::EmptyDag);
        }
        let edges = self.edges()?;

        let mut out = String::new();
        if let Some(title) = options.title.as_deref() {
            // Comments end at the line break.
            let title = title.replace(['\r', '\n'], " ");
            let _ = writeln!(out, "%% {}", title);
        }
        let _ = writeln!(out, "flowchart {}", options.direction);

        for node in self.nodes() {
            let _ = writeln!(
                out,
                "    {}[{}]",
                sanitize_mermaid_id(node.id()),
                escape_mermaid_label(&label(node))
            );
        }

        let mut seen = HashSet::new();
        for (from, to) in edges {
            let line = format!(
                "    {} --> {}",
                sanitize_mermaid_id(from),
                sanitize_mermaid_id(to)
            );
            if seen.insert(line.clone()) {
                out.push_str(&line);
                out.push('\n');
            }
        }

        if options.with_styles {
            for status in NodeStatus::ALL {
                let _ = writeln!(out, "    classDef {} {}", status, class_def(status));
            }
            for node in self.nodes() {
                let status = self.status(node.id()).unwrap_or_default();
                let _ = writeln!(out, "    class {} {}", sanitize_mermaid_id(node.id()), status);
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::tests::{built, TestNode};

    #[test]
    fn test_sanitize_plain_and_edge_cases() {
        assert_eq!(sanitize_mermaid_id("abc123"), "abc123");
        assert_eq!(sanitize_mermaid_id("123abc"), "_123abc");
        assert_eq!(sanitize_mermaid_id("hello_world"), "hello__world");
        assert_eq!(sanitize_mermaid_id(""), "_empty_");
        assert_eq!(sanitize_mermaid_id("end"), "end");
        assert_eq!(sanitize_mermaid_id("a-b"), "a_2d_b");
    }

    #[test]
    fn test_sanitize_leading_digit_stays_distinct() {
        let ids = ["1", "n1", "_1", "\u{1}", "1_", "\u{1}_", "12", "\u{12}"];
        let sanitized: std::collections::HashSet<_> =
            ids.iter().map(|id| sanitize_mermaid_id(id)).collect();
        assert_eq!(sanitized.len(), ids.len());
        assert_eq!(sanitize_mermaid_id("1"), "_1");
        assert_eq!(sanitize_mermaid_id("n1"), "n1");
        assert!(validate_mermaid_id(&sanitize_mermaid_id("1")));
    }

    #[test]
    fn test_sanitize_truncates_long_ids() {
        let id = sanitize_mermaid_id(&"a".repeat(1000));
        assert!(id.len() < 200);
        assert!(id.ends_with("_etc"));
    }

    #[test]
    fn test_sanitize_always_valid() {
        let inputs = [
            "abc",
            "1; DROP TABLE users; --",
            "<script>alert(1)</script>",
            "节点_一",
            "🚀 launch",
            "ＡＢＣ",
            "\0\x01\x02",
            "a\"b'c`d",
            "9",
            "___",
        ];
        for input in inputs {
            let id = sanitize_mermaid_id(input);
            assert!(validate_mermaid_id(&id), "{input:?} -> {id:?}");
        }
    }

    #[test]
    fn test_validate_rejects_bad_ids() {
        assert!(validate_mermaid_id("node_1"));
        assert!(!validate_mermaid_id(""));
        assert!(!validate_mermaid_id("1node"));
        assert!(!validate_mermaid_id("a-b"));
    }

    #[test]
    fn test_escape_label_examples() {
        assert_eq!(escape_mermaid_label("<script>"), "\"#lt;script#gt;\"");
        assert_eq!(escape_mermaid_label("a\nb"), "\"a<br/>b\"");
        assert_eq!(escape_mermaid_label("a\r\nb"), "\"a<br/>b\"");
        assert_eq!(escape_mermaid_label("a\rb"), "\"ab\"");
        assert_eq!(escape_mermaid_label(""), "\"\"");
        assert_eq!(escape_mermaid_label("f(x)"), "\"f#40;x#41;\"");
        assert_eq!(escape_mermaid_label("{a|b}"), "\"#123;a#124;b#125;\"");
        assert_eq!(escape_mermaid_label("[\\]"), "\"#91;#92;#93;\"");
        assert_eq!(escape_mermaid_label("say \"hi\" & go"), "\"say #quot;hi#quot; #amp; go\"");
        assert_eq!(escape_mermaid_label("a\0b"), "\"a#0;b\"");
    }

    #[test]
    fn test_escape_label_never_leaks_structural_chars() {
        let hostile = "'; DROP TABLE x; --\"]) --> evil[(\"<img src=x>\")]\t\u{0}｛全角｝🚀";
        let escaped = escape_mermaid_label(hostile);
        let inner = &escaped[1..escaped.len() - 1];
        for forbidden in ['"', '[', ']', '(', ')', '{', '}', '|', '<', '>', '\n', '\r', '\0'] {
            let allowed_br = forbidden == '<' || forbidden == '>';
            let occurrences = inner.matches(forbidden).count();
            if allowed_br {
                assert_eq!(occurrences, inner.matches("<br/>").count());
            } else {
                assert_eq!(occurrences, 0, "leaked {forbidden:?} in {escaped}");
            }
        }
        assert!(escaped.starts_with('"') && escaped.ends_with('"'));
    }

    #[test]
    fn test_flowchart_layout() {
        let dag = built(vec![
            TestNode::new("A", &[]),
            TestNode::new("B", &["A", "A"]),
            TestNode::new("C", &["A", "B", "missing"]),
        ]);
        let chart = dag
            .mermaid_flowchart(&MermaidOptions::default())
            .expect("chart");
        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines[0], "flowchart TB");
        assert_eq!(lines[1].trim(), "A[\"A\"]");
        assert_eq!(lines[2].trim(), "B[\"B\"]");
        assert_eq!(lines[3].trim(), "C[\"C\"]");
        assert_eq!(chart.matches("A --> B").count(), 1);
        assert!(chart.contains("A --> C"));
        assert!(chart.contains("B --> C"));
        assert!(!chart.contains("missing"));
        assert_eq!(
            chart,
            dag.mermaid_flowchart(&MermaidOptions::default())
                .expect("chart")
        );
    }

    #[test]
    fn test_flowchart_options() {
        let dag = built(vec![TestNode::new("x", &[]), TestNode::new("y", &["x"])]);
        dag.set_status("x", NodeStatus::Completed).expect("status");
        let options = MermaidOptions::default()
            .with_direction(MermaidDirection::LR)
            .with_title("My Flow")
            .with_styles();
        let chart = dag.mermaid_flowchart(&options).expect("chart");
        assert!(chart.starts_with("%% My Flow\nflowchart LR\n"));
        for status in ["pending", "processing", "completed", "failed", "skipped"] {
            assert!(chart.contains(&format!("classDef {status} ")));
        }
        assert!(chart.contains("class x completed"));
        assert!(chart.contains("class y pending"));
    }

    #[test]
    fn test_flowchart_custom_labels() {
        let dag = built(vec![TestNode::new("x", &[])]);
        let chart = dag
            .mermaid_flowchart_with(&MermaidOptions::default(), |node| {
                format!("Node <{}>", node.id)
            })
            .expect("chart");
        assert!(chart.contains("x[\"Node #lt;x#gt;\"]"));
    }

    #[test]
    fn test_flowchart_empty_dag() {
        let dag: Dag<TestNode> = Dag::new();
        assert_eq!(
            dag.mermaid_flowchart(&MermaidOptions::default()),
            Err(DagError::EmptyDag)
        );
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(MermaidDirection::parse("lr"), Some(MermaidDirection::LR));
        assert_eq!(MermaidDirection::parse("sideways"), None);
    }
}
