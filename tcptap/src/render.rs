//! Event rendering
//!
//! One line per delivered record, either aligned text or a JSON object.
//! The text form follows the capture's relative clock: the first
//! record's timestamp anchors the seconds column.

use serde::Serialize;
use tcptap_common::{TcpEvent, COMM_LEN};

/// How delivered events are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Aligned text lines
    Text,
    /// One JSON object per line
    Json,
}

/// Renders the command-name bytes for display: lossy UTF-8 with the
/// zero padding stripped.
pub fn render_comm(comm: &[u8; COMM_LEN]) -> String {
    String::from_utf8_lossy(comm)
        .trim_end_matches('\0')
        .to_string()
}

fn kind_label(event: &TcpEvent) -> &'static str {
    match event.event_kind() {
        Some(kind) => kind.label(),
        None => "UNKNOWN",
    }
}

/// JSON form of one delivered record
#[derive(Debug, Serialize)]
struct RenderedEvent<'a> {
    timestamp_ns: u64,
    kind: &'a str,
    pid: u32,
    ppid: u32,
    comm: String,
    bytes: u32,
}

/// Stateful line renderer
pub struct Renderer {
    mode: RenderMode,
    first_ts: Option<u64>,
}

impl Renderer {
    pub fn new(mode: RenderMode) -> Renderer {
        Renderer {
            mode,
            first_ts: None,
        }
    }

    /// Renders one record as a line without the trailing newline.
    pub fn line(&mut self, event: &TcpEvent) -> String {
        match self.mode {
            RenderMode::Text => self.text_line(event),
            RenderMode::Json => json_line(event),
        }
    }

    fn text_line(&mut self, event: &TcpEvent) -> String {
        let first = *self.first_ts.get_or_insert(event.timestamp_ns);
        let secs = event.timestamp_ns.saturating_sub(first) as f64 / 1e9;
        format!(
            "{:>10.6} | {:<7} | PID={} PPID={} ({}) | bytes={}",
            secs,
            kind_label(event),
            event.pid,
            event.ppid,
            render_comm(&event.comm),
            event.byte_count,
        )
    }
}

fn json_line(event: &TcpEvent) -> String {
    let rendered = RenderedEvent {
        timestamp_ns: event.timestamp_ns,
        kind: kind_label(event),
        pid: event.pid,
        ppid: event.ppid,
        comm: render_comm(&event.comm),
        bytes: event.byte_count,
    };
    serde_json::to_string(&rendered).unwrap_or_else(|_| String::from("{}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcptap_common::{comm_from_bytes, EventKind};

    fn event(kind: EventKind, ts: u64, bytes: u32) -> TcpEvent {
        TcpEvent::new(kind, 4242, 1000, bytes, ts, comm_from_bytes(b"python3"))
    }

    #[test]
    fn test_comm_rendering_strips_zero_padding() {
        assert_eq!(render_comm(&comm_from_bytes(b"python3")), "python3");
        assert_eq!(render_comm(&comm_from_bytes(b"")), "");
        // A full-width name renders unchanged
        assert_eq!(
            render_comm(&comm_from_bytes(b"sixteen-byte-cmd")),
            "sixteen-byte-cmd"
        );
    }

    #[test]
    fn test_text_line_is_relative_to_the_first_event() {
        let mut renderer = Renderer::new(RenderMode::Text);
        let first = renderer.line(&event(EventKind::Connect, 5_000_000_000, 0));
        let second = renderer.line(&event(EventKind::Send, 5_500_000_000, 512));

        assert!(first.starts_with("  0.000000 |"));
        assert!(first.contains("CONNECT"));
        assert!(second.starts_with("  0.500000 |"));
        assert!(second.contains("SEND"));
        assert!(second.contains("PID=4242 PPID=1000 (python3)"));
        assert!(second.ends_with("bytes=512"));
    }

    #[test]
    fn test_json_line_carries_every_field() {
        let mut renderer = Renderer::new(RenderMode::Json);
        let line = renderer.line(&event(EventKind::Recv, 123, 2048));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["timestamp_ns"], 123);
        assert_eq!(value["kind"], "RECV");
        assert_eq!(value["pid"], 4242);
        assert_eq!(value["ppid"], 1000);
        assert_eq!(value["comm"], "python3");
        assert_eq!(value["bytes"], 2048);
    }

    #[test]
    fn test_unknown_kind_tag_renders_without_panicking() {
        let mut raw = event(EventKind::Close, 1, 0);
        raw.kind = 99;
        let mut renderer = Renderer::new(RenderMode::Text);
        assert!(renderer.line(&raw).contains("UNKNOWN"));
    }
}
