use std::collections::HashMap;

use crate::error::RowError;
use crate::record::{MutationRecord, Substitution};

/// The fixed chromosome key set, in karyotype order.
pub const CHROMOSOMES: [&str; 24] = [
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y",
];

/// Counter keyed by category label. Reads of absent keys return 0, writes
/// create the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountMap(HashMap<String, u64>);

impl CountMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, count: u64) {
        *self.0.entry(key.to_string()).or_insert(0) += count;
    }

    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn merge(&mut self, other: &CountMap) {
        for (key, count) in &other.0 {
            *self.0.entry(key.clone()).or_insert(0) += count;
        }
    }

    /// Entries ordered by descending count, ties by key, for exports and
    /// top-N chart selection.
    pub fn sorted_desc(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self.0.iter().map(|(k, &v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

/// Counter over the fixed 24-chromosome key set. All keys exist from
/// construction; a write to any other key is a lookup error and never
/// widens the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeCounts(HashMap<String, u64>);

impl Default for ChromosomeCounts {
    fn default() -> Self {
        Self::new()
    }
}

impl ChromosomeCounts {
    pub fn new() -> Self {
        Self(CHROMOSOMES.iter().map(|c| (c.to_string(), 0)).collect())
    }

    pub fn add(&mut self, chromosome: &str, count: u64) -> Result<(), RowError> {
        match self.0.get_mut(chromosome) {
            Some(slot) => {
                *slot += count;
                Ok(())
            }
            None => Err(RowError::UnknownChromosome(chromosome.to_string())),
        }
    }

    pub fn get(&self, chromosome: &str) -> u64 {
        self.0.get(chromosome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn merge(&mut self, other: &ChromosomeCounts) {
        for (chromosome, count) in &other.0 {
            if let Some(slot) = self.0.get_mut(chromosome) {
                *slot += count;
            }
        }
    }

    /// Entries in karyotype order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        CHROMOSOMES.iter().map(move |c| (*c, self.get(c)))
    }
}

/// Aggregated statistics for one cohort, or for the global aggregate of all
/// cohorts. Created all-zero, filled by add_record while a cohort is
/// consumed, then only merged or exported.
///
/// total_substitutions counts substitution rows unweighted, while every
/// other tally weights by affected_cases: it is the number of distinct
/// substitution events, not of affected individuals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CohortStatistics {
    pub protein_counts: CountMap,
    pub chromosome_counts: ChromosomeCounts,
    pub consequence_counts: CountMap,
    pub substitution_counts: CountMap,
    pub transitions: u64,
    pub transversions: u64,
    pub total_cases: u64,
    pub total_substitutions: u64,
}

impl CohortStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tally one validated record. The chromosome lookup runs first so a
    /// rejected row leaves every tally untouched.
    pub fn add_record(&mut self, record: &MutationRecord) -> Result<(), RowError> {
        let cases = record.affected_cases;
        self.chromosome_counts.add(&record.chromosome, cases)?;
        self.protein_counts.add(&record.protein, cases);
        self.consequence_counts.add(&record.consequence, cases);
        self.total_cases += cases;

        if let Some(change) = record.base_change {
            self.total_substitutions += 1;
            self.substitution_counts.add(&change.label(), cases);
            match change.classify() {
                Substitution::Transition => self.transitions += cases,
                Substitution::Transversion => self.transversions += cases,
            }
        }

        Ok(())
    }

    /// Field-wise sum. Associative and commutative, so cohorts can be
    /// merged in any order or folded incrementally.
    pub fn merge(&mut self, other: &CohortStatistics) {
        self.protein_counts.merge(&other.protein_counts);
        self.chromosome_counts.merge(&other.chromosome_counts);
        self.consequence_counts.merge(&other.consequence_counts);
        self.substitution_counts.merge(&other.substitution_counts);
        self.transitions += other.transitions;
        self.transversions += other.transversions;
        self.total_cases += other.total_cases;
        self.total_substitutions += other.total_substitutions;
    }
}

/// Reduce any sequence of cohort statistics into one global aggregate.
pub fn merge_all<'a, I>(cohorts: I) -> CohortStatistics
where
    I: IntoIterator<Item = &'a CohortStatistics>,
{
    let mut global = CohortStatistics::new();
    for cohort in cohorts {
        global.merge(cohort);
    }
    global
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_record;
    use pretty_assertions::assert_eq;

    fn record(
        protein: &str,
        dna_change: &str,
        consequence: &str,
        cases: u64,
    ) -> MutationRecord {
        parse_record(protein, dna_change, consequence, &cases.to_string())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn empty_cohort_has_all_zero_counts_and_full_chromosome_key_set() {
        let stats = CohortStatistics::new();
        assert_eq!(stats.total_cases, 0);
        assert_eq!(stats.total_substitutions, 0);
        assert_eq!(stats.transitions, 0);
        assert_eq!(stats.transversions, 0);
        assert!(stats.protein_counts.is_empty());
        assert!(stats.consequence_counts.is_empty());
        assert!(stats.substitution_counts.is_empty());
        for chromosome in CHROMOSOMES {
            assert_eq!(stats.chromosome_counts.get(chromosome), 0);
        }
        assert_eq!(stats.chromosome_counts.iter_ordered().count(), 24);
    }

    #[test]
    fn missense_scenario_tallies_every_dimension() {
        let mut stats = CohortStatistics::new();
        stats
            .add_record(&record(
                "p.V600E",
                "chr7:g.140453136A>T",
                "missense_variant",
                5,
            ))
            .unwrap();

        assert_eq!(stats.protein_counts.get("p.V600E"), 5);
        assert_eq!(stats.chromosome_counts.get("7"), 5);
        assert_eq!(stats.chromosome_counts.total(), 5);
        assert_eq!(stats.consequence_counts.get("missense_variant"), 5);
        assert_eq!(stats.substitution_counts.get("A>T"), 5);
        assert_eq!(stats.transversions, 5);
        assert_eq!(stats.transitions, 0);
        assert_eq!(stats.total_cases, 5);
        assert_eq!(stats.total_substitutions, 1);
    }

    #[test]
    fn partition_law_every_dimension_sums_to_total_cases() {
        let mut stats = CohortStatistics::new();
        for rec in [
            record("p.V600E", "chr7:g.140453136A>T", "missense_variant", 5),
            record("p.R175H", "chr17:g.7674220C>T", "missense_variant", 8),
            record("p.T910Mfs*47", "chr5:g.112839521delC", "frameshift_variant", 3),
            record("p.V600E", "chr7:g.140453137A>G", "missense_variant", 2),
        ] {
            stats.add_record(&rec).unwrap();
        }

        assert_eq!(stats.total_cases, 18);
        assert_eq!(stats.protein_counts.total(), stats.total_cases);
        assert_eq!(stats.chromosome_counts.total(), stats.total_cases);
        assert_eq!(stats.consequence_counts.total(), stats.total_cases);
    }

    #[test]
    fn substitution_law_classes_partition_weighted_substitutions() {
        let mut stats = CohortStatistics::new();
        let records = [
            record("p.V600E", "chr7:g.140453136A>T", "missense_variant", 5),
            record("p.R175H", "chr17:g.7674220C>T", "missense_variant", 8),
            // Carries no base change; must not enter the substitution tallies.
            record("p.T910Mfs*47", "chr5:g.112839521delC", "frameshift_variant", 3),
        ];
        for rec in &records {
            stats.add_record(rec).unwrap();
        }

        let weighted: u64 = records
            .iter()
            .filter(|r| r.base_change.is_some())
            .map(|r| r.affected_cases)
            .sum();
        assert_eq!(stats.transitions + stats.transversions, weighted);
        assert_eq!(stats.substitution_counts.total(), weighted);
        // Unweighted: two substitution rows regardless of their case counts.
        assert_eq!(stats.total_substitutions, 2);
    }

    #[test]
    fn unknown_chromosome_is_rejected_and_leaves_statistics_untouched() {
        let mut stats = CohortStatistics::new();
        let bad = record("p.V600E", "chrMT:g.1A>T", "missense_variant", 4);
        let err = stats.add_record(&bad).unwrap_err();
        assert_eq!(err, RowError::UnknownChromosome("MT".to_string()));
        assert_eq!(stats, CohortStatistics::new());
    }

    #[test]
    fn merge_sums_totals_across_cohorts() {
        let mut a = CohortStatistics::new();
        a.add_record(&record("p.V600E", "chr7:g.1A>T", "missense_variant", 10))
            .unwrap();
        let mut b = CohortStatistics::new();
        b.add_record(&record("p.R175H", "chr17:g.2C>T", "missense_variant", 7))
            .unwrap();

        let mut global = a.clone();
        global.merge(&b);
        assert_eq!(global.total_cases, 17);
        assert_eq!(global.protein_counts.get("p.V600E"), 10);
        assert_eq!(global.protein_counts.get("p.R175H"), 7);
        assert_eq!(global.chromosome_counts.get("7"), 10);
        assert_eq!(global.chromosome_counts.get("17"), 7);
        assert_eq!(global.transitions, 7);
        assert_eq!(global.transversions, 10);
    }

    #[test]
    fn reduction_is_order_independent_and_matches_single_aggregator() {
        let rows: [&[(&str, &str, &str, u64)]; 3] = [
            &[
                ("p.V600E", "chr7:g.140453136A>T", "missense_variant", 5),
                ("p.G12D", "chr12:g.25245350C>T", "missense_variant", 9),
            ],
            &[
                ("p.R175H", "chr17:g.7674220C>T", "missense_variant", 8),
                ("p.E545K", "chr3:g.179218303G>A", "missense_variant", 4),
            ],
            &[("p.T910Mfs*47", "chr5:g.112839521delC", "frameshift_variant", 3)],
        ];

        let cohorts: Vec<CohortStatistics> = rows
            .iter()
            .map(|cohort_rows| {
                let mut stats = CohortStatistics::new();
                for (p, d, c, n) in cohort_rows.iter() {
                    stats.add_record(&record(p, d, c, *n)).unwrap();
                }
                stats
            })
            .collect();

        let forward = merge_all(&cohorts);
        let rotated = merge_all([&cohorts[1], &cohorts[2], &cohorts[0]]);
        assert_eq!(forward, rotated);

        let mut single = CohortStatistics::new();
        for cohort_rows in rows.iter() {
            for (p, d, c, n) in cohort_rows.iter() {
                single.add_record(&record(p, d, c, *n)).unwrap();
            }
        }
        assert_eq!(forward, single);
    }

    #[test]
    fn merging_an_empty_cohort_is_identity() {
        let mut stats = CohortStatistics::new();
        stats
            .add_record(&record("p.V600E", "chr7:g.1A>T", "missense_variant", 5))
            .unwrap();
        let before = stats.clone();
        stats.merge(&CohortStatistics::new());
        assert_eq!(stats, before);
    }

    #[test]
    fn count_map_reads_absent_keys_as_zero() {
        let mut counts = CountMap::new();
        assert_eq!(counts.get("p.V600E"), 0);
        counts.add("p.V600E", 3);
        counts.add("p.V600E", 2);
        assert_eq!(counts.get("p.V600E"), 5);
        assert_eq!(counts.len(), 1);
    }

    #[test]
    fn count_map_orders_by_count_then_key() {
        let mut counts = CountMap::new();
        counts.add("p.A", 2);
        counts.add("p.B", 7);
        counts.add("p.C", 2);
        assert_eq!(
            counts.sorted_desc(),
            vec![("p.B", 7), ("p.A", 2), ("p.C", 2)]
        );
    }
}
