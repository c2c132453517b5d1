use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// Directories holding crate sources. Anything else under the root is not ours to police.
const SOURCE_DIRS: [&str; 4] = ["terms", "cli", "tests", "benches"];

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ForbiddenCommentWord,
    StarsInComment,
    AllCapsComment,
    AllowDeadCode,
}

impl Rule {
    fn pattern(self) -> String {
        match self {
            Rule::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            Rule::ForbiddenCommentWord => {
                format!(r"(//|/\*|///).*(?:{})", FORBIDDEN_WORDS.join("|"))
            }
            Rule::StarsInComment => r"(//|/\*).*\*\*".to_string(),
            Rule::AllCapsComment => r"(//|/\*|///).*".to_string(),
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        }
    }

    fn description(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => "underscore-prefixed variables",
            Rule::ForbiddenCommentWord => "forbidden comment words",
            Rule::StarsInComment => "'**' patterns in regular comments",
            Rule::AllCapsComment => "comments with all uppercase alphabetic characters",
            Rule::AllowDeadCode => "#[allow(dead_code)] attributes",
        }
    }

    fn advice(self) -> String {
        match self {
            Rule::UnderscorePrefix => {
                "Either use the variable (removing the underscore) or remove it completely."
                    .to_string()
            }
            Rule::ForbiddenCommentWord => format!(
                "Comments containing {} are not allowed. Remove them rather than commenting them out.",
                FORBIDDEN_WORDS.join(", ")
            ),
            Rule::StarsInComment => "'**' is only allowed in doc comments.".to_string(),
            Rule::AllCapsComment => "Consider deleting the comment completely.".to_string(),
            Rule::AllowDeadCode => {
                "Either use the code (removing the attribute) or remove it completely.".to_string()
            }
        }
    }

    // Decides whether a line the pattern matched really breaks the rule.
    fn is_violation(self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self {
            Rule::UnderscorePrefix => !(is_comment(trimmed) || underscore_only_in_strings(line)),
            Rule::ForbiddenCommentWord | Rule::AllowDeadCode => true,
            Rule::StarsInComment => !trimmed.starts_with("///"),
            Rule::AllCapsComment => comment_text(trimmed).is_some_and(|text| {
                let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
                !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
            }),
        }
    }
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with("//") || trimmed.starts_with("/*")
}

fn underscore_only_in_strings(line: &str) -> bool {
    line.split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn comment_text(trimmed: &str) -> Option<&str> {
    if let Some(rest) = trimmed.strip_prefix("///") {
        Some(rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        Some(rest.trim())
    } else if let Some(idx) = trimmed.find("/*") {
        let body = &trimmed[idx + 2..];
        Some(body.find("*/").map_or(body, |end| &body[..end]).trim())
    } else {
        None
    }
}

// Collects every offending line of one file for a single rule.
struct ViolationCollector {
    rule: Rule,
    file_path: PathBuf,
    violations: Vec<String>,
}

impl ViolationCollector {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            file_path: file_path.to_path_buf(),
            violations: Vec::new(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.description(),
            self.file_path.display()
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {}\n", self.rule.advice()));
        Some(error_msg)
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.rule.is_violation(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn source_files() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn scan_sources(files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let rules = [
        Rule::UnderscorePrefix,
        Rule::ForbiddenCommentWord,
        Rule::StarsInComment,
        Rule::AllCapsComment,
        Rule::AllowDeadCode,
    ];
    let mut searcher = Searcher::new();
    for rule in rules {
        let matcher = RegexMatcher::new_line_matcher(&rule.pattern())?;
        for path in files {
            let mut collector = ViolationCollector::new(rule, path);
            searcher.search_path(&matcher, path, &mut collector)?;
            if let Some(error_message) = collector.check_and_get_error_message() {
                return Err(error_message.into());
            }
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let files = source_files();
    if let Err(e) = scan_sources(&files) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=CNGENDER_BUILD_TIMESTAMP={timestamp}");
}
