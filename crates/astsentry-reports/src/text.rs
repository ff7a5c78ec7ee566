//! Plain text rendering, one line per finding.

use std::io::Write;

use astsentry_core::{Finding, FindingKind};

use crate::reporter::{ReportError, Reporter};

/// Render a finding the way the text reporter prints it.
///
/// Vulnerabilities carry the resolved file path; usage findings only the line.
pub fn render_finding(finding: &Finding) -> String {
    match finding.kind() {
        FindingKind::Vulnerability => format!(
            "{}, file \"{}\", line {}",
            finding.message(),
            finding.file().display(),
            finding.line()
        ),
        FindingKind::Usage { .. } => format!("{} in line {}", finding.message(), finding.line()),
    }
}

pub struct TextReporter<W: Write> {
    writer: W,
}

impl<W: Write> TextReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn emit(&mut self, finding: &Finding) -> Result<(), ReportError> {
        writeln!(self.writer, "{}", render_finding(finding))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{finding, usage};

    #[test]
    fn test_text_output() {
        let mut reporter = TextReporter::new(Vec::new());
        reporter.emit(&finding("CVE-2017-7189", 12)).unwrap();
        reporter.emit(&usage("$stmt->execute", 40)).unwrap();
        reporter.finish().unwrap();

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        insta::assert_snapshot!(output, @r###"
        Potential CVE-2017-7189 detected, file "/srv/wordpress/wp-includes/http.php", line 12
        Database call '$stmt->execute' in line 40
        "###);
    }
}
