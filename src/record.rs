use crate::error::RowError;

/// Column names a cohort TSV must provide, in the positional order assumed
/// when no header row is present.
pub const REQUIRED_COLUMNS: [&str; 4] = [
    "protein_change",
    "dna_change",
    "consequence",
    "num_cohort_ssm_affected_cases",
];

/// A single-nucleotide substitution, e.g. A>T.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseChange {
    pub from: char,
    pub to: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substitution {
    Transition,
    Transversion,
}

impl BaseChange {
    /// Tally key in the "X>Y" form.
    pub fn label(&self) -> String {
        format!("{}>{}", self.from, self.to)
    }

    /// Transition = purine<->purine or pyrimidine<->pyrimidine (A<->G, C<->T);
    /// transversion = the class flips. Anything outside the explicit
    /// cross-class test falls into the transition branch.
    pub fn classify(&self) -> Substitution {
        let purine = |b: char| b == 'A' || b == 'G';
        let pyrimidine = |b: char| b == 'T' || b == 'C';
        if purine(self.from) && pyrimidine(self.to) || pyrimidine(self.from) && purine(self.to) {
            Substitution::Transversion
        } else {
            Substitution::Transition
        }
    }
}

/// One validated mutation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub protein: String,
    pub chromosome: String,
    pub base_change: Option<BaseChange>,
    pub consequence: String,
    pub affected_cases: u64,
}

/// Length of the locus prefix ("chr") in front of the chromosome label.
const LOCUS_PREFIX_LEN: usize = 3;

/// Parse one raw row into a record.
///
/// Returns Ok(None) for rows without a protein change or DNA change — an
/// expected data-quality filter, not an error. Returns Err only for a
/// malformed affected-case count; chromosome validity is checked later,
/// against the fixed key set, when the record is tallied.
pub fn parse_record(
    protein_change: &str,
    dna_change: &str,
    consequence: &str,
    affected_cases: &str,
) -> Result<Option<MutationRecord>, RowError> {
    if protein_change.trim().is_empty() || dna_change.trim().is_empty() {
        return Ok(None);
    }

    // First whitespace-delimited token, e.g. "p.V600E" from "p.V600E missense".
    let protein = protein_change
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string();

    // "chr7:g.140453136A>T" -> locus "chr7" -> chromosome "7". A locus
    // segment shorter than the prefix yields an empty label that fails the
    // fixed-key lookup downstream.
    let locus = dna_change.split(':').next().unwrap_or("");
    let chromosome = locus.get(LOCUS_PREFIX_LEN..).unwrap_or("").to_string();

    // A single-nucleotide change ends in the 3-character window "X>Y";
    // indels and deletions do not and carry no substitution.
    let bytes = dna_change.as_bytes();
    let base_change = if dna_change.is_ascii() && bytes.len() >= 3 && bytes[bytes.len() - 2] == b'>'
    {
        Some(BaseChange {
            from: bytes[bytes.len() - 3] as char,
            to: bytes[bytes.len() - 1] as char,
        })
    } else {
        None
    };

    let trimmed = affected_cases.trim();
    let cases = trimmed
        .parse::<i64>()
        .map_err(|_| RowError::BadCaseCount(trimmed.to_string()))?;
    if cases < 0 {
        return Err(RowError::BadCaseCount(trimmed.to_string()));
    }

    Ok(Some(MutationRecord {
        protein,
        chromosome,
        base_change,
        consequence: consequence.to_string(),
        affected_cases: cases as u64,
    }))
}
