//! Prompt templates and response parsers shared by every remote provider.
//! Model output is untrusted: every name it returns is checked against the
//! list it was given.

use super::{ClassifierError, DocumentAnalysis};

pub const MAX_PATH_RETRIES: usize = 3;
const DEFAULT_CONFIDENCE: u8 = 5;
const MAX_CONFIDENCE: u8 = 10;

const ANALYSIS_FIELDS: [&str; 7] = [
    "TITLE",
    "SUGGESTED_PATH",
    "CONFIDENCE",
    "YEAR",
    "DATE",
    "ENTITY",
    "SUMMARY",
];

pub const DOCUMENT_ANALYSIS_PROMPT: &str = "\
You are a helpful assistant analyzing a document. Your output should have exactly the following format:

---
TITLE: <a short title>
SUGGESTED_PATH: <where the document should be filed>
CONFIDENCE: <confidence in the suggested path on a scale of 1 (lowest) to 10 (highest)>
YEAR: <the year the document is about>
DATE: <the date the document was created or sent>
ENTITY: <the entity the document is about>
SUMMARY: <a short summary of the document, not more than 100 words>
---

Some specific guidelines:
- Title is a short title of the document, not more than 10 words.
- The year is the year the document is about, which may be different from the year in the date. For a tax document, it is the tax year.
- Entity is often the name of the company or organization the document is from or to. For a bank statement, it is the bank's name.
- Summary is a short summary of the document, not more than 100 words.
- Suggested path is the most important part of the output. It is where the document should be filed.

MOST IMPORTANT: Make sure the suggested path is a valid path in the layout below! Do not invent paths that are not in the layout.

The layout description for the document store follow after this line.
---
";

const DUPLICATE_DETECTION_PROMPT: &str = "\
You are analyzing a list of company folder names to find duplicates.
These folders are meant to store documents from different companies, but sometimes the same company
has been filed under different names (e.g., \"Chase Bank\" and \"Chase\", or \"Goldman Sachs\" and \"GS\").

Your task is to find EXACTLY ONE pair of folder names that likely refer to the same company.

Rules:
- Only identify folders that clearly refer to the SAME company (not related companies or subsidiaries)
- If you find multiple potential duplicates, return only the MOST OBVIOUS one
- If no duplicates exist, return \"None\"

You MUST respond in EXACTLY this format (no other text):
DUPLICATE: FolderA | FolderB

Or if no duplicates:
DUPLICATE: None

Here are the folder names to analyze:
";

pub fn build_analysis_prompt(layout_text: &str, hint: &str, inbox_path: &str) -> String {
    let mut prompt = format!("{DOCUMENT_ANALYSIS_PROMPT}{layout_text}");
    if !inbox_path.is_empty() {
        prompt.push_str(&format!(
            "\n---\nThis document came from the inbox path: {inbox_path}"
        ));
    }
    if !hint.is_empty() {
        prompt.push_str(&format!(
            "\n---\nOne last hint, in a different place this document was filed as: {hint}"
        ));
    }
    prompt
}

pub fn build_compare_prompt(a: &str, b: &str) -> String {
    format!(
        "You are a helpful assistant that identifies if two company or organization names refer to the same entity.

Compare these two names:
1. \"{a}\"
2. \"{b}\"

Consider that:
- Different capitalizations (e.g., \"Chase\" vs \"CHASE\") are the same
- Abbreviations vs full names (e.g., \"JP Morgan\" vs \"JPMorgan Chase\") are the same
- Minor punctuation differences (e.g., \"J.P. Morgan\" vs \"JP Morgan\") are the same
- Parent/subsidiary relationships where the name is essentially the same are matches

Respond with EXACTLY one word: MATCH or NO_MATCH
"
    )
}

fn bullet_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("- {name}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_duplicate_prompt(names: &[String]) -> String {
    format!("{DUPLICATE_DETECTION_PROMPT}{}", bullet_list(names))
}

pub fn build_folder_match_prompt(new_name: &str, existing: &[String]) -> String {
    format!(
        "You are checking if a new company folder name should use an existing folder instead.

New folder name: \"{new_name}\"

Existing folders in this directory:
{existing_list}

Determine if the new name is a SPELLING VARIATION of any existing folder (same company, different formatting).

MATCH examples (same company, different spelling/format):
- \"JPMorgan\" matches \"J.P. Morgan\" or \"JP Morgan Chase\"
- \"ATT\" matches \"AT&T\"
- \"GS\" matches \"Goldman Sachs\"
- \"Citi\" matches \"Citibank\" or \"Citigroup\"
- \"Dr Jones\" matches \"Dr. Jones\" or \"Jones M.D.\" (you can assume last names are unique and can be used to identify the company)

NO MATCH examples (different companies or intentionally separate):
- \"Chase Bank\" does NOT match \"Wells Fargo\" (different companies)
- \"Bank of America\" does NOT match \"American Bank\" (different companies despite similar words)
- If BOTH \"Chase\" AND \"JPMorgan\" exist as separate folders, a new \"JPMorgan Chase\" should NOT match either (the user has chosen to keep them separate)

Respond with EXACTLY one line:
MATCH: <exact existing folder name from the list>
or
NO_MATCH
",
        existing_list = bullet_list(existing)
    )
}

/// Follow-up message after the model proposed a path the layout rejects.
pub fn path_feedback(suggested: &str) -> String {
    let lower = suggested.trim().trim_end_matches('/').to_ascii_lowercase();
    let mut feedback = String::from("This is incorrect, the path that you suggested is not valid. ");
    if lower.ends_with("by company") {
        feedback.push_str(
            "You used 'By company' literally - you must replace it with the actual company/entity name (e.g., 'Medical & Health/Bills/Chase' not 'Medical & Health/Bills/By company').",
        );
    } else if lower.ends_with("by year") {
        feedback.push_str(
            "You used 'By year' literally - you must replace it with the actual year (e.g., 'Taxes/Federal/2024' not 'Taxes/Federal/By year').",
        );
    } else {
        feedback.push_str(
            "The path structure must match the layout. Where the layout shows 'By company', use the actual company/entity name. Where it shows 'By year', use the actual year. You may create new company or year folders as needed.",
        );
    }
    feedback.push_str(" Try again.");
    feedback
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn parse_analysis_response(text: &str) -> Result<DocumentAnalysis, ClassifierError> {
    let mut fields: [Option<String>; 7] = Default::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("---") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if let Some(idx) = ANALYSIS_FIELDS.iter().position(|f| *f == key.trim()) {
            fields[idx] = Some(value.trim().to_string());
        }
    }

    let missing: Vec<&str> = ANALYSIS_FIELDS
        .iter()
        .zip(fields.iter())
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();
    if !missing.is_empty() {
        return Err(ClassifierError::Parse(format!(
            "missing fields: {}",
            missing.join(", ")
        )));
    }
    let [title, path, confidence, year, date, entity, summary] = fields.map(Option::unwrap_or_default);

    let confidence = confidence
        .parse::<u32>()
        .map(|c| c.min(u32::from(MAX_CONFIDENCE)) as u8)
        .unwrap_or(DEFAULT_CONFIDENCE);

    Ok(DocumentAnalysis {
        title,
        suggested_path: path,
        confidence,
        year: optional(&year).and_then(|y| y.parse::<i32>().ok()),
        date: optional(&date),
        entity: optional(&entity),
        summary,
    })
}

fn find_in_list(candidate: &str, names: &[String]) -> Option<String> {
    names
        .iter()
        .find(|n| n.as_str() == candidate)
        .or_else(|| names.iter().find(|n| n.eq_ignore_ascii_case(candidate)))
        .cloned()
}

pub fn parse_duplicate_response(text: &str, names: &[String]) -> Option<(String, String)> {
    for line in text.trim().lines() {
        let line = line.trim();
        if !line.to_ascii_uppercase().starts_with("DUPLICATE:") {
            continue;
        }
        let value = line.split_once(':').map_or("", |(_, v)| v.trim());
        if value.eq_ignore_ascii_case("none") {
            return None;
        }
        let parts: Vec<&str> = value.split('|').map(str::trim).collect();
        let [a, b] = parts.as_slice() else {
            continue;
        };
        match (find_in_list(a, names), find_in_list(b, names)) {
            (Some(a), Some(b)) if a != b => return Some((a, b)),
            _ => tracing::warn!("duplicate pair not in folder list: '{a}' | '{b}'"),
        }
    }
    None
}

pub fn parse_folder_match_response(text: &str, folders: &[String]) -> Option<String> {
    for line in text.trim().lines() {
        let line = line.trim();
        let upper = line.to_ascii_uppercase();
        if upper.starts_with("NO_MATCH") || upper == "NO MATCH" {
            return None;
        }
        if upper.starts_with("MATCH:") {
            let name = line.split_once(':').map_or("", |(_, v)| v.trim());
            let found = find_in_list(name, folders);
            if found.is_none() {
                tracing::warn!("matched folder not in list: '{name}'");
            }
            return found;
        }
    }
    None
}

pub fn parse_compare_response(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("MATCH")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    const GOOD: &str = "---
TITLE: Bank Statement
SUGGESTED_PATH: Financial/Banking
CONFIDENCE: 8
YEAR: 2024
DATE: 2024-03
ENTITY: Chase
SUMMARY: Monthly statement: checking account.
---";

    #[test]
    fn analysis_response_parses_all_fields() {
        let got = parse_analysis_response(GOOD).expect("parse");
        assert_eq!(got.title, "Bank Statement");
        assert_eq!(got.suggested_path, "Financial/Banking");
        assert_eq!(got.confidence, 8);
        assert_eq!(got.year, Some(2024));
        assert_eq!(got.date.as_deref(), Some("2024-03"));
        assert_eq!(got.entity.as_deref(), Some("Chase"));
        assert_eq!(got.summary, "Monthly statement: checking account.");
    }

    #[test]
    fn analysis_response_normalises_soft_fields() {
        let text = GOOD
            .replace("CONFIDENCE: 8", "CONFIDENCE: high")
            .replace("YEAR: 2024", "YEAR: None")
            .replace("ENTITY: Chase", "ENTITY:");
        let got = parse_analysis_response(&text).expect("parse");
        assert_eq!(got.confidence, 5);
        assert_eq!(got.year, None);
        assert_eq!(got.entity, None);

        let loud = GOOD.replace("CONFIDENCE: 8", "CONFIDENCE: 42");
        assert_eq!(parse_analysis_response(&loud).expect("parse").confidence, 10);
    }

    #[test]
    fn analysis_response_missing_field_is_unusable() {
        let text = GOOD.replace("SUMMARY: Monthly statement: checking account.", "");
        let err = parse_analysis_response(&text).expect_err("must fail");
        assert!(err.to_string().contains("SUMMARY"));
    }

    #[test]
    fn duplicate_response_validates_against_list() {
        let list = names(&["Chase", "Chase Bank", "Wells Fargo"]);
        assert_eq!(
            parse_duplicate_response("DUPLICATE: chase | Chase Bank", &list),
            Some(("Chase".to_string(), "Chase Bank".to_string()))
        );
        assert_eq!(parse_duplicate_response("DUPLICATE: None", &list), None);
        assert_eq!(parse_duplicate_response("DUPLICATE: Chase | Citi", &list), None);
        assert_eq!(parse_duplicate_response("DUPLICATE: Chase | chase", &list), None);
        assert_eq!(parse_duplicate_response("no idea", &list), None);
    }

    #[test]
    fn folder_match_accepts_only_listed_names() {
        let list = names(&["J.P. Morgan", "Wells Fargo"]);
        assert_eq!(
            parse_folder_match_response("MATCH: j.p. morgan", &list).as_deref(),
            Some("J.P. Morgan")
        );
        assert_eq!(parse_folder_match_response("MATCH: JPMorgan Chase", &list), None);
        assert_eq!(parse_folder_match_response("NO_MATCH", &list), None);
    }

    #[test]
    fn feedback_targets_literal_placeholders() {
        assert!(path_feedback("Medical/Bills/By company").contains("'By company' literally"));
        assert!(path_feedback("Taxes/Federal/by year").contains("'By year' literally"));
        assert!(path_feedback("Nowhere").contains("must match the layout"));
        assert!(path_feedback("Nowhere").ends_with("Try again."));
    }

    #[test]
    fn analysis_prompt_appends_context() {
        let prompt = build_analysis_prompt("LAYOUT", "Old/Place", "inbox/a.pdf");
        assert!(prompt.starts_with(DOCUMENT_ANALYSIS_PROMPT));
        assert!(prompt.contains("LAYOUT\n---\nThis document came from the inbox path: inbox/a.pdf"));
        assert!(prompt.ends_with("was filed as: Old/Place"));
        assert!(build_duplicate_prompt(&names(&["A", "B"])).ends_with("- A\n- B"));
        assert!(parse_compare_response(" match\n"));
        assert!(!parse_compare_response("NO_MATCH"));
    }
}
