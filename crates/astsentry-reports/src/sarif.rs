use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;

use astsentry_core::{Finding, FindingKind, Rule, RuleCategory};

use crate::filename::artifact_uri;
use crate::reporter::{ReportError, Reporter};

/// SARIF (Static Analysis Results Interchange Format) v2.1.0 implementation
/// Spec: https://docs.oasis-open.org/sarif/sarif/v2.1.0/sarif-v2.1.0.html

const SARIF_SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
const FINGERPRINT_KEY: &str = "astsentry/v1";

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifReport {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub runs: Vec<SarifRun>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifRun {
    pub tool: SarifTool,
    pub results: Vec<SarifResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<SarifArtifact>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocations: Option<Vec<SarifInvocation>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifDriver {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub information_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<SarifRule>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRule {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<SarifMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<SarifRuleProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_configuration: Option<SarifConfiguration>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifRuleProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifConfiguration {
    pub level: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifMessage {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifResult {
    pub rule_id: String,
    pub rule_index: usize,
    pub level: String,
    pub message: SarifMessage,
    pub locations: Vec<SarifLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_fingerprints: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    pub physical_location: SarifPhysicalLocation,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    pub artifact_location: SarifArtifactLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<SarifRegion>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifArtifactLocation {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifRegion {
    #[serde(rename = "startLine")]
    pub start_line: usize,
    #[serde(rename = "startColumn", skip_serializing_if = "Option::is_none")]
    pub start_column: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifArtifact {
    pub location: SarifArtifactLocation,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifInvocation {
    #[serde(rename = "executionSuccessful")]
    pub execution_successful: bool,
    #[serde(rename = "startTimeUtc", skip_serializing_if = "Option::is_none")]
    pub start_time_utc: Option<String>,
    #[serde(rename = "endTimeUtc", skip_serializing_if = "Option::is_none")]
    pub end_time_utc: Option<String>,
}

impl SarifReport {
    /// Export SARIF report to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load SARIF report from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Rule metadata captured up front so the document can list every active
/// rule, including ones that never matched.
#[derive(Debug, Clone)]
struct RuleEntry {
    id: String,
    description: String,
    help_uri: Option<String>,
    category: RuleCategory,
}

/// Buffers findings and writes a single SARIF document on `finish`.
pub struct SarifReporter<W: Write> {
    writer: W,
    rules: Vec<RuleEntry>,
    tool_version: String,
    source_root: Option<PathBuf>,
    results: Vec<SarifResult>,
    artifacts: Vec<SarifArtifact>,
    artifact_index: HashMap<String, usize>,
    started_at: chrono::DateTime<chrono::Utc>,
    execution_successful: bool,
    finished: bool,
}

impl<W: Write> SarifReporter<W> {
    pub fn new(writer: W, rules: &[Box<dyn Rule>]) -> Self {
        Self {
            writer,
            rules: rules
                .iter()
                .map(|rule| RuleEntry {
                    id: rule.id().to_string(),
                    description: rule.description().to_string(),
                    help_uri: rule.help_uri().map(str::to_string),
                    category: rule.category(),
                })
                .collect(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            source_root: None,
            results: Vec::new(),
            artifacts: Vec::new(),
            artifact_index: HashMap::new(),
            started_at: chrono::Utc::now(),
            execution_successful: true,
            finished: false,
        }
    }

    /// Make artifact URIs relative to `root`.
    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = version.into();
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn rule_index(&mut self, finding: &Finding) -> usize {
        if let Some(index) = self.rules.iter().position(|rule| rule.id == finding.rule_id()) {
            return index;
        }
        // Findings from rules that were not declared still need a driver entry.
        let category = match finding.kind() {
            FindingKind::Vulnerability => RuleCategory::Vulnerability,
            FindingKind::Usage { category, .. } => RuleCategory::Usage(category.clone()),
        };
        self.rules.push(RuleEntry {
            id: finding.rule_id().to_string(),
            description: finding.rule_id().to_string(),
            help_uri: None,
            category,
        });
        self.rules.len() - 1
    }

    fn artifact(&mut self, uri: &str) -> usize {
        if let Some(&index) = self.artifact_index.get(uri) {
            return index;
        }
        let index = self.artifacts.len();
        self.artifacts.push(SarifArtifact {
            location: SarifArtifactLocation {
                uri: uri.to_string(),
                index: Some(index),
            },
            mime_type: guess_mime_type(uri),
        });
        self.artifact_index.insert(uri.to_string(), index);
        index
    }

    fn build_report(&mut self) -> SarifReport {
        let rules = self.rules.iter().map(create_rule).collect();

        SarifReport {
            schema: SARIF_SCHEMA.to_string(),
            version: "2.1.0".to_string(),
            runs: vec![SarifRun {
                tool: SarifTool {
                    driver: SarifDriver {
                        name: "astsentry".to_string(),
                        version: self.tool_version.clone(),
                        information_uri: Some(
                            "https://github.com/HikaruEgashira/astsentry".to_string(),
                        ),
                        rules: Some(rules),
                    },
                },
                results: std::mem::take(&mut self.results),
                artifacts: Some(std::mem::take(&mut self.artifacts)),
                invocations: Some(vec![SarifInvocation {
                    execution_successful: self.execution_successful,
                    start_time_utc: Some(self.started_at.to_rfc3339()),
                    end_time_utc: Some(chrono::Utc::now().to_rfc3339()),
                }]),
            }],
        }
    }
}

impl<W: Write> Reporter for SarifReporter<W> {
    fn emit(&mut self, finding: &Finding) -> Result<(), ReportError> {
        let rule_index = self.rule_index(finding);
        let uri = artifact_uri(finding.file(), self.source_root.as_deref());
        let artifact_index = self.artifact(&uri);

        self.results.push(SarifResult {
            rule_id: finding.rule_id().to_string(),
            rule_index,
            level: level_for(finding.kind()).to_string(),
            message: SarifMessage {
                text: finding.message().to_string(),
            },
            locations: vec![SarifLocation {
                physical_location: SarifPhysicalLocation {
                    artifact_location: SarifArtifactLocation {
                        uri: uri.clone(),
                        index: Some(artifact_index),
                    },
                    region: Some(SarifRegion {
                        start_line: finding.line(),
                        // SARIF columns are 1-based
                        start_column: Some(finding.column() + 1),
                    }),
                },
            }],
            partial_fingerprints: Some(generate_fingerprints(&uri, finding)),
        });
        Ok(())
    }

    fn run_completed(&mut self, successful: bool) {
        self.execution_successful = successful;
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let report = self.build_report();
        serde_json::to_writer_pretty(&mut self.writer, &report)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        log::debug!(
            "Wrote SARIF report with {} results",
            report.runs.first().map_or(0, |run| run.results.len())
        );
        Ok(())
    }
}

fn create_rule(rule: &RuleEntry) -> SarifRule {
    let (tags, level) = match &rule.category {
        RuleCategory::Vulnerability => (vec!["security".to_string()], "error"),
        RuleCategory::Usage(category) => (
            vec!["usage".to_string(), category.to_lowercase()],
            "warning",
        ),
    };

    SarifRule {
        id: rule.id.clone(),
        name: rule.id.clone(),
        short_description: Some(SarifMessage {
            text: rule.description.clone(),
        }),
        help_uri: rule.help_uri.clone(),
        properties: Some(SarifRuleProperties { tags: Some(tags) }),
        default_configuration: Some(SarifConfiguration {
            level: level.to_string(),
        }),
    }
}

fn level_for(kind: &FindingKind) -> &'static str {
    match kind {
        FindingKind::Vulnerability => "error",
        FindingKind::Usage { .. } => "warning",
    }
}

/// Stable across runs and machines: only the relative URI, the rule, the
/// line, and the message go into the hash.
fn generate_fingerprints(uri: &str, finding: &Finding) -> BTreeMap<String, String> {
    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    hasher.update(b"\0");
    hasher.update(finding.rule_id().as_bytes());
    hasher.update(b"\0");
    hasher.update(finding.line().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(finding.message().as_bytes());

    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();

    let mut fingerprints = BTreeMap::new();
    fingerprints.insert(FINGERPRINT_KEY.to_string(), hex);
    fingerprints
}

fn guess_mime_type(uri: &str) -> Option<String> {
    match uri.rsplit_once('.').map(|(_, ext)| ext) {
        Some("php" | "phtml" | "inc") => Some("application/x-httpd-php".to_string()),
        Some("js") => Some("application/javascript".to_string()),
        Some("py") => Some("text/x-python".to_string()),
        _ => Some("text/plain".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{finding, usage};
    use astsentry_core::{NodeId, Tree, TreeError};

    struct StubRule {
        id: &'static str,
        category: RuleCategory,
    }

    impl Rule for StubRule {
        fn id(&self) -> &str {
            self.id
        }

        fn category(&self) -> RuleCategory {
            self.category.clone()
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn help_uri(&self) -> Option<&str> {
            Some("https://example.invalid/rule")
        }

        fn evaluate(&self, _node: NodeId, _tree: &dyn Tree) -> Result<Vec<Finding>, TreeError> {
            Ok(Vec::new())
        }
    }

    fn rules() -> Vec<Box<dyn Rule>> {
        vec![
            Box::new(StubRule {
                id: "CVE-2017-7189",
                category: RuleCategory::Vulnerability,
            }),
            Box::new(StubRule {
                id: "DB-CALL",
                category: RuleCategory::Usage("Database".to_string()),
            }),
        ]
    }

    fn write_report(findings: &[Finding]) -> SarifReport {
        let mut reporter = SarifReporter::new(Vec::new(), &rules())
            .with_source_root("/srv/wordpress")
            .with_tool_version("0.1.0");
        for finding in findings {
            reporter.emit(finding).unwrap();
        }
        reporter.finish().unwrap();

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        SarifReport::from_json(&output).unwrap()
    }

    #[test]
    fn test_sarif_report_structure() {
        let report = write_report(&[finding("CVE-2017-7189", 12), usage("mysql_query", 30)]);

        assert_eq!(report.version, "2.1.0");
        assert_eq!(report.runs.len(), 1);

        let run = &report.runs[0];
        assert_eq!(run.tool.driver.name, "astsentry");
        assert_eq!(run.tool.driver.version, "0.1.0");
        assert_eq!(run.tool.driver.rules.as_ref().unwrap().len(), 2);
        assert_eq!(run.results.len(), 2);
        assert_eq!(run.artifacts.as_ref().unwrap().len(), 1);

        let vuln = &run.results[0];
        assert_eq!(vuln.rule_id, "CVE-2017-7189");
        assert_eq!(vuln.rule_index, 0);
        assert_eq!(vuln.level, "error");
        let location = &vuln.locations[0].physical_location;
        assert_eq!(location.artifact_location.uri, "wp-includes/http.php");
        assert_eq!(location.region.as_ref().unwrap().start_line, 12);
        assert_eq!(location.region.as_ref().unwrap().start_column, Some(1));

        let db = &run.results[1];
        assert_eq!(db.rule_index, 1);
        assert_eq!(db.level, "warning");
        assert_eq!(db.message.text, "Database call 'mysql_query'");
    }

    #[test]
    fn test_sarif_json_field_names() {
        let mut reporter = SarifReporter::new(Vec::new(), &rules());
        reporter.emit(&finding("CVE-2017-7189", 12)).unwrap();
        reporter.finish().unwrap();
        let json = String::from_utf8(reporter.into_inner()).unwrap();

        assert!(json.contains("\"$schema\""));
        assert!(json.contains("\"ruleId\": \"CVE-2017-7189\""));
        assert!(json.contains("\"partialFingerprints\""));
        assert!(json.contains("\"shortDescription\""));
        assert!(json.contains("\"executionSuccessful\": true"));
    }

    #[test]
    fn test_failed_run_is_not_successful() {
        let mut reporter = SarifReporter::new(Vec::new(), &rules());
        reporter.emit(&finding("CVE-2017-7189", 12)).unwrap();
        reporter.run_completed(false);
        reporter.finish().unwrap();

        let report = SarifReport::from_json(&String::from_utf8(reporter.into_inner()).unwrap())
            .unwrap();
        let invocations = report.runs[0].invocations.as_ref().unwrap();
        assert!(!invocations[0].execution_successful);
        assert_eq!(report.runs[0].results.len(), 1);
    }

    #[test]
    fn test_fingerprints_are_stable() {
        let first = write_report(&[finding("CVE-2017-7189", 12)]);
        let second = write_report(&[finding("CVE-2017-7189", 12)]);
        let moved = write_report(&[finding("CVE-2017-7189", 13)]);

        let print = |report: &SarifReport| {
            report.runs[0].results[0]
                .partial_fingerprints
                .as_ref()
                .unwrap()[FINGERPRINT_KEY]
                .clone()
        };
        assert_eq!(print(&first), print(&second));
        assert_ne!(print(&first), print(&moved));
        assert_eq!(print(&first).len(), 64);
    }

    #[test]
    fn test_undeclared_rule_gets_driver_entry() {
        let report = write_report(&[finding("CVE-2019-9025", 3)]);
        let run = &report.runs[0];

        assert_eq!(run.tool.driver.rules.as_ref().unwrap().len(), 3);
        assert_eq!(run.results[0].rule_index, 2);
    }

    #[test]
    fn test_empty_report() {
        let report = write_report(&[]);
        assert!(report.runs[0].results.is_empty());
        assert_eq!(report.runs[0].tool.driver.rules.as_ref().unwrap().len(), 2);
    }
}
