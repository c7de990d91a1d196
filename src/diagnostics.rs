//! Diagnostic rendering.

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use settle_core::{CompilationPhase, Diagnostic, DiagnosticSeverity};

/// Get the display color for a compilation phase.
pub fn phase_color(phase: &CompilationPhase) -> Color {
    match phase {
        CompilationPhase::Classification => Color::Yellow,
        CompilationPhase::Lowering => Color::Cyan,
        CompilationPhase::Emission => Color::Blue,
    }
}

/// Normalize a span to ensure end > start (required by ariadne).
pub fn normalize_span(start: usize, end: usize) -> (usize, usize) {
    (start, end.max(start + 1))
}

fn report_kind(severity: DiagnosticSeverity) -> ReportKind<'static> {
    match severity {
        DiagnosticSeverity::Error => ReportKind::Error,
        DiagnosticSeverity::Warning => ReportKind::Warning,
        DiagnosticSeverity::Info => ReportKind::Advice,
    }
}

/// Render a diagnostic against its source text.
///
/// Colors are left out when `colored` is false, which keeps the output
/// stable for logs and snapshots.
pub fn render_diagnostic(diag: &Diagnostic, source: &str, file_path: &str, colored: bool) -> String {
    let (start, end) = normalize_span(diag.span.start, diag.span.end);
    let mut out = Vec::new();
    let written = Report::build(report_kind(diag.severity), (file_path, start..end))
        .with_config(Config::default().with_color(colored))
        .with_code(format!("{:?}", diag.phase))
        .with_message(&diag.message)
        .with_label(
            Label::new((file_path, start..end))
                .with_message(&diag.message)
                .with_color(phase_color(&diag.phase)),
        )
        .finish()
        .write((file_path, Source::from(source)), &mut out);
    match written {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => diag.to_string(),
    }
}

/// Print a diagnostic to stderr.
pub fn print_diagnostic(diag: &Diagnostic, source: &str, file_path: &str) {
    eprint!("{}", render_diagnostic(diag, source, file_path, true));
}

#[cfg(test)]
mod tests {
    use settle_core::Span;

    use super::*;

    #[test]
    fn test_phase_colors() {
        assert_eq!(phase_color(&CompilationPhase::Classification), Color::Yellow);
        assert_eq!(phase_color(&CompilationPhase::Lowering), Color::Cyan);
        assert_eq!(phase_color(&CompilationPhase::Emission), Color::Blue);
    }

    #[test]
    fn test_normalize_span_valid() {
        assert_eq!(normalize_span(0, 10), (0, 10));
        assert_eq!(normalize_span(5, 15), (5, 15));
    }

    #[test]
    fn test_normalize_span_zero_length() {
        assert_eq!(normalize_span(5, 5), (5, 6));
        assert_eq!(normalize_span(0, 0), (0, 1));
    }

    #[test]
    fn test_render_mentions_message_and_phase() {
        let source = "using x = make();\n";
        let diag = Diagnostic::error(
            CompilationPhase::Classification,
            Span::new(10, 16),
            "`x` is not disposable",
        );
        let rendered = render_diagnostic(&diag, source, "main.ts", false);
        assert!(rendered.contains("Classification"));
        assert!(rendered.contains("`x` is not disposable"));
        assert!(rendered.contains("main.ts"));
    }
}
