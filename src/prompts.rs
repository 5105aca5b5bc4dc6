//! The table-extraction prompt sent to the VLM.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tuning the digit-confusion list or the
//!    output contract requires editing exactly one place.
//! 2. **Testability** — unit tests can assert the prompt still carries the
//!    load-bearing instructions (JSON-array contract, column names) without
//!    spinning up a real VLM.
//!
//! Callers can override it via
//! [`crate::config::ExtractionConfig::prompt`]; the constant here is used
//! only when no override is provided.

/// Default prompt for extracting all rows of one reading-sheet page.
///
/// The sheet layout and the heuristics encoded here come straight from the
/// field material: black-and-white scans, printed previous readings,
/// handwritten current readings in the rightmost column, horizontal
/// gridlines that frequently cross the handwritten digits.
pub const TABLE_EXTRACTION_PROMPT: &str = r#"This is a water meter reading table in Serbian/Bosnian language (scanned in black and white).

The table has these columns (from left to right):
1. Redni broj (row number) - ignore this
2. Sifra (code/ID) - printed numbers (8 digits like 00020011)
3. Tip (type) - ignore this
4. Korisnik/Adresa (user/address) - ignore this
5. Novi status (new status) - decimal number, PRINTED
6. Staro stanje (old reading) - integer, PRINTED (4 digits typically)
7. Novo stanje (new reading) - integer, HANDWRITTEN (rightmost column, 4 digits typically)

CRITICAL INSTRUCTIONS FOR READING HANDWRITTEN NUMBERS:

1. COMMON MISTAKES TO AVOID:
   - Don't confuse 1 and 7
   - Don't confuse 0 and 6
   - Don't confuse 3 and 8
   - Don't confuse 5 and S
   - Don't confuse 2 and Z

2. IGNORE TABLE LINES:
   - The table has horizontal lines between rows
   - These lines may touch or cross numbers
   - DO NOT interpret lines as part of digits
   - If a number looks like "3105" but the middle digit has a line through it, it's probably "305" not "3105"
   - Focus on the actual handwritten strokes, not the printed table lines

3. VALIDATION LOGIC:
   - novo_stanje should be CLOSE TO staro_stanje (usually within 0-200 units difference)
   - If your reading shows novo_stanje is 1000+ units away from staro_stanje, you probably misread it
   - Water meters don't jump by thousands of units
   - Most readings differ by 0-100 units

4. NUMBER LENGTH:
   - staro_stanje is typically 4 digits (e.g., 3306, 5236, 2538)
   - novo_stanje should also be 4 digits typically
   - If you read a 5-digit number (like 13106), check if it should be 4 digits (like 3106 or 1306)

Extract ALL rows of data you can read. For each row, extract:
- sifra: the code/ID (8 digits, like 00020011, 00020012)
- novi_status: decimal number from the printed column
- staro_stanje: old reading integer from the printed column (4 digits typically)
- novo_stanje: NEW reading integer from the HANDWRITTEN column (should be close to staro_stanje)

Return a JSON array with ALL rows:
[
  {"sifra": "00020011", "novi_status": "0.0", "staro_stanje": "3306", "novo_stanje": "3326"},
  {"sifra": "00020012", "novi_status": "6.0", "staro_stanje": "5236", "novo_stanje": "5256"}
]

FINAL CHECK BEFORE RETURNING:
- Does novo_stanje make sense compared to staro_stanje?
- Are both numbers similar length (usually 4 digits)?
- Did you accidentally include a table line as a digit?

Return ONLY the JSON array, no explanation."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_all_extracted_columns() {
        for field in ["sifra", "novi_status", "staro_stanje", "novo_stanje"] {
            assert!(
                TABLE_EXTRACTION_PROMPT.contains(field),
                "prompt must name the '{field}' field"
            );
        }
    }

    #[test]
    fn prompt_demands_bare_json_array() {
        assert!(TABLE_EXTRACTION_PROMPT.contains("JSON array"));
        assert!(TABLE_EXTRACTION_PROMPT.contains("Return ONLY the JSON array"));
    }

    #[test]
    fn prompt_example_rows_are_valid_json() {
        // The inline example must stay parseable — models copy its shape.
        let anchor = TABLE_EXTRACTION_PROMPT
            .find("Return a JSON array with ALL rows:")
            .unwrap();
        let start = TABLE_EXTRACTION_PROMPT[anchor..].find('[').unwrap() + anchor;
        let end = TABLE_EXTRACTION_PROMPT[start..].find(']').unwrap() + start;
        let example = &TABLE_EXTRACTION_PROMPT[start..=end];
        let parsed: serde_json::Value =
            serde_json::from_str(example).expect("example block must be valid JSON");
        assert!(parsed.as_array().is_some());
    }
}
