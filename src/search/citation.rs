//! Citation formatting for standards-style references

/// Format a citation in standards-compliant form
///
/// Components are joined with ", " and missing pieces are omitted:
/// `"{title}[, Clause X.Y.Z[ (Section Title)]][, p.N | pp.N-M]"`.
/// A bare clause id is prefixed with "Clause"; ids already starting
/// with "Clause" or "Section" are kept as given.
pub fn format_citation(
    document_title: &str,
    clause_number: Option<&str>,
    page_numbers: Option<&[u32]>,
    section_title: Option<&str>,
) -> String {
    let mut components = vec![document_title.to_string()];

    if let Some(clause) = clause_number.filter(|c| !c.is_empty()) {
        let lower = clause.to_lowercase();
        let mut clause_part = if lower.starts_with("section") || lower.starts_with("clause") {
            clause.to_string()
        } else {
            format!("Clause {clause}")
        };

        if let Some(title) = section_title.filter(|t| !t.is_empty()) {
            clause_part = format!("{clause_part} ({title})");
        }
        components.push(clause_part);
    }

    if let Some(pages) = page_numbers.filter(|p| !p.is_empty()) {
        let low = pages.iter().min().copied().unwrap_or_default();
        let high = pages.iter().max().copied().unwrap_or_default();
        if low == high {
            components.push(format!("p.{low}"));
        } else {
            components.push(format!("pp.{low}-{high}"));
        }
    }

    components.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_citation() {
        assert_eq!(
            format_citation(
                "ISO/IEC/IEEE 12207:2017",
                Some("6.4.2"),
                Some(&[23]),
                Some("Verification"),
            ),
            "ISO/IEC/IEEE 12207:2017, Clause 6.4.2 (Verification), p.23"
        );
    }

    #[test]
    fn test_title_only() {
        assert_eq!(format_citation("NASA SE Handbook", None, None, None), "NASA SE Handbook");
    }

    #[test]
    fn test_pages_without_clause() {
        assert_eq!(
            format_citation("INCOSE SE Handbook", None, Some(&[45]), None),
            "INCOSE SE Handbook, p.45"
        );
    }

    #[test]
    fn test_clause_without_pages() {
        assert_eq!(
            format_citation("IEEE 15288:2023", Some("5.1"), None, None),
            "IEEE 15288:2023, Clause 5.1"
        );
    }

    #[test]
    fn test_page_range() {
        assert_eq!(
            format_citation(
                "INCOSE SE Handbook",
                Some("Section 4.2"),
                Some(&[45, 46, 47]),
                Some("Requirements Definition"),
            ),
            "INCOSE SE Handbook, Section 4.2 (Requirements Definition), pp.45-47"
        );
    }

    #[test]
    fn test_existing_prefix_not_doubled() {
        assert_eq!(
            format_citation("Doc", Some("Clause 7"), None, None),
            "Doc, Clause 7"
        );
    }

    #[test]
    fn test_section_title_needs_clause() {
        // A section title without a clause id is not emitted
        assert_eq!(
            format_citation("Doc", None, None, Some("Verification")),
            "Doc"
        );
    }
}
