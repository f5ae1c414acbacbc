use crate::research::types::CurationReport;
use std::fmt::Write;

pub fn render_text(report: &CurationReport) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Scanned {} papers, {} recent, {} candidates, {} analyzed.",
        report.total_scanned, report.recent, report.candidates, report.analyzed.len());
    if report.candidates == 0 {
        s.push_str("No papers matched the keyword filter.\n");
        return s;
    }
    if report.relevant.is_empty() {
        s.push_str("No papers reached the relevance threshold.\n");
        return s;
    }
    let _ = writeln!(s, "\n{} relevant:", report.relevant.len());
    for (ix, p) in report.relevant.iter().enumerate() {
        let _ = writeln!(s, "\n{}. [{}/10] {}", ix + 1, p.score.unwrap_or(0), p.title);
        if !p.authors.is_empty() {
            let _ = writeln!(s, "   {}", p.authors_joined());
        }
        let _ = writeln!(s, "   https://arxiv.org/abs/{}", p.short_id());
        if let Some(r) = p.reasoning.as_deref() {
            let _ = writeln!(s, "   {}", r.trim());
        }
    }
    s
}
