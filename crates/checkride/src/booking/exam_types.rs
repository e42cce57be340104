//! Free-text exam-type normalization and examiner qualification matching.
//!
//! Real-world qualification strings carry airframe suffixes ("DPE-PE-ASEL")
//! and directory entries mix separators, so matching is deliberately loose:
//! a required code only has to appear as a substring of a held token. The
//! code tables below therefore avoid the bare two-letter aliases from the
//! legacy directory ("PE", "CE"), which collide across certificate families
//! once substring matching is in play.

/// Synonym table, checked in declaration order. Exact case-insensitive match
/// first, then substring containment; the ordering is the tie-break, so more
/// specific keys ("CFII", "Instrument Instructor") come before the shorter
/// keys they contain.
const SYNONYMS: &[(&str, &str)] = &[
    ("Private Pilot Single Engine", "Private"),
    ("Private Single Engine", "Private"),
    ("Private Pilot", "Private"),
    ("Private", "Private"),
    ("Instrument Rating", "Instrument"),
    ("Instrument Instructor", "CFII"),
    ("CFII", "CFII"),
    ("Instrument", "Instrument"),
    ("Commercial Pilot Single Engine", "Commercial"),
    ("Commercial Single Engine", "Commercial"),
    ("Commercial Pilot", "Commercial"),
    ("Commercial", "Commercial"),
    ("Certified Flight Instructor", "CFI"),
    ("Flight Instructor", "CFI"),
    ("CFI", "CFI"),
    ("Multi Engine Instructor", "MEI"),
    ("MEI", "MEI"),
    ("Multi Engine", "MultiEngine"),
    ("MultiEngine", "MultiEngine"),
    ("Airline Transport Pilot", "ATP"),
    ("ATP", "ATP"),
    ("Sport Pilot", "SportPilot"),
    ("SportPilot", "SportPilot"),
];

/// Acceptable examiner qualification codes per canonical exam type.
const QUALIFICATION_CODES: &[(&str, &[&str])] = &[
    ("Private", &["DPE-PE-ASEL", "DPE-PE"]),
    ("Instrument", &["DPE-CIRE-ASEL", "DPE-CIRE", "CIRE"]),
    ("Commercial", &["DPE-CE-ASEL", "DPE-CE"]),
    ("CFI", &["DPE-FIE", "DPE-CFI", "FIE"]),
    ("CFII", &["DPE-CFII", "CFII"]),
    ("MEI", &["DPE-MEI", "MEI"]),
    ("MultiEngine", &["DPE-ME-AMEL", "AMEL"]),
    ("ATP", &["DPE-ATP", "ATP"]),
    ("SportPilot", &["DPE-SP", "SP"]),
];

/// Normalizes a free-text exam-type name into its canonical form.
///
/// Unknown types pass through trimmed rather than failing, so a booking for
/// an exotic checkride still reaches the matcher.
pub fn canonicalize(exam_type: &str) -> String {
    let trimmed = exam_type.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    for (key, canonical) in SYNONYMS {
        if trimmed.eq_ignore_ascii_case(key) {
            return (*canonical).to_string();
        }
    }

    let haystack = trimmed.to_ascii_uppercase();
    for (key, canonical) in SYNONYMS {
        if haystack.contains(&key.to_ascii_uppercase()) {
            return (*canonical).to_string();
        }
    }

    trimmed.to_string()
}

/// Acceptable qualification codes for a canonical exam type. Unknown
/// canonical types fall back to the canonical string itself.
pub fn required_qualification_codes(canonical: &str) -> Vec<String> {
    for (key, codes) in QUALIFICATION_CODES {
        if canonical.eq_ignore_ascii_case(key) {
            return codes.iter().map(|code| (*code).to_string()).collect();
        }
    }
    vec![canonical.to_string()]
}

/// True when any required code for `exam_type` appears (case-insensitively)
/// inside any token of the examiner's delimiter-separated qualification
/// field.
pub fn has_matching_qualification(examiner_qualifications: &str, exam_type: &str) -> bool {
    if examiner_qualifications.trim().is_empty() || exam_type.trim().is_empty() {
        return false;
    }

    let required = required_qualification_codes(&canonicalize(exam_type));
    let held: Vec<String> = examiner_qualifications
        .split([',', ';'])
        .map(|token| token.trim().to_ascii_uppercase())
        .filter(|token| !token.is_empty())
        .collect();

    required.iter().any(|code| {
        let code = code.to_ascii_uppercase();
        held.iter().any(|token| token.contains(&code))
    })
}
