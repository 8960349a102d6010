//! Plain progress lines on stdout; script output passes through verbatim.

use kdeploy_core::progress::{Outcome, ProgressEvent, ProgressSink, Stage};
use std::io::Write;

/// Prints one line per progress event.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintProgress;

impl ProgressSink for PrintProgress {
    fn emit(&self, event: ProgressEvent) {
        if let Outcome::Output { stdout, stderr } = &event.outcome {
            // A closed stream is not worth failing the deployment over.
            let _ = std::io::stdout().lock().write_all(stdout.as_bytes());
            let _ = std::io::stderr().lock().write_all(stderr.as_bytes());
            return;
        }
        let mut stdout = std::io::stdout().lock();
        // A closed stdout is not worth failing the deployment over.
        let _ = writeln!(stdout, "{}", format_event(&event));
    }
}

/// Render an event as `====> <stage> <subject>: <outcome>`.
pub fn format_event(event: &ProgressEvent) -> String {
    let subject = match &event.kind {
        Some(kind) => format!("{kind} {:?}", event.name),
        None => format!("{:?}", event.name),
    };
    let verb = match event.stage {
        Stage::Pull => "Pulling",
        Stage::Script => "Running script",
        Stage::Login => "Logging in to",
        Stage::Build => "Building",
        Stage::Namespace => "Namespace",
        Stage::Create => "Creating",
        Stage::Destroy => "Destroying",
        Stage::Update => "Updating",
        Stage::AutoUpdate => "Auto-updating",
        Stage::Clean => "Cleaning",
    };
    let outcome = match &event.outcome {
        Outcome::Started => String::new(),
        Outcome::Succeeded => ": done".to_string(),
        Outcome::AlreadyExists => ": already exists".to_string(),
        Outcome::NotExisted => ": does not exist".to_string(),
        Outcome::Skipped(reason) => format!(": skipped ({reason})"),
        Outcome::Changed(change) => format!(": {change}"),
        Outcome::Output { stdout, stderr } => {
            format!(": printed {} bytes", stdout.len() + stderr.len())
        }
    };
    if event.namespace.is_empty() {
        format!("====> {verb} {subject}{outcome}")
    } else {
        format!("====> {verb} {subject} in {:?}{outcome}", event.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_events_name_kind_and_namespace() {
        let event = ProgressEvent::asset(Stage::Create, "deployment", "web", "shop", Outcome::AlreadyExists);
        assert_eq!(
            format_event(&event),
            r#"====> Creating deployment "web" in "shop": already exists"#
        );
    }

    #[test]
    fn started_events_have_no_outcome() {
        let event = ProgressEvent::new(Stage::Script, "./migrate.sh", "", Outcome::Started);
        assert_eq!(format_event(&event), r#"====> Running script "./migrate.sh""#);
    }

    #[test]
    fn skipped_events_carry_the_reason() {
        let event = ProgressEvent::asset(
            Stage::AutoUpdate,
            "deployment",
            "web",
            "shop",
            Outcome::Skipped("registry not supported".into()),
        );
        assert!(format_event(&event).ends_with(": skipped (registry not supported)"));
    }

    #[test]
    fn output_events_summarize_their_size() {
        let event = ProgressEvent::new(
            Stage::Script,
            "make",
            "shop",
            Outcome::Output {
                stdout: "ok\n".into(),
                stderr: "warn\n".into(),
            },
        );
        assert_eq!(
            format_event(&event),
            r#"====> Running script "make" in "shop": printed 8 bytes"#
        );
    }
}
