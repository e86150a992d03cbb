//! Feature/target assembly from sensor readings.
//!
//! Walks Product -> ProcessStep -> SensorReading through the step
//! specification that owns each feature, applies the requested reductions
//! per process step and re-keys the result by product. Two output modes:
//! a wide aggregated table, or long-format time series when no reduction
//! was requested.
//!
//! The canonical row order of the wide tables is descending product id.
//! Feature columns are reductions named `<feature><method>`; target
//! columns are the literal single readings named `<feature>` with no
//! method suffix. Targets are ground truth and are never reduced, in
//! either mode.

use std::collections::HashMap;

use rand::seq::index;
use rand::Rng;

use super::table::{FeatureTable, StackedTable};
use crate::error::DatasetError;
use crate::model::{ProcessParameter, QualityCharacteristic, ReductionSet};
use crate::store::{FeatureKind, StackedReading, Store};

/// One selected feature: a process parameter or quality characteristic
/// together with the step specification that owns it.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: i64,
    pub name: String,
    pub kind: FeatureKind,
    pub step_specification_id: Option<i64>,
}

impl From<ProcessParameter> for Feature {
    fn from(p: ProcessParameter) -> Self {
        Feature {
            id: p.id,
            name: p.name,
            kind: FeatureKind::Parameter,
            step_specification_id: p.process_step_specification_id,
        }
    }
}

impl From<QualityCharacteristic> for Feature {
    fn from(c: QualityCharacteristic) -> Self {
        Feature {
            id: c.id,
            name: c.name,
            kind: FeatureKind::Characteristic,
            step_specification_id: c.process_step_specification_id,
        }
    }
}

/// Applies the row cap to the candidate set and fixes the canonical order.
///
/// When the candidate count exceeds the cap, either a uniform random
/// sample without replacement is drawn, or (deterministic mode) the
/// lowest-id prefix is taken after sorting ascending. The final set is
/// always sorted descending by id.
pub fn select_products<R: Rng>(
    mut candidates: Vec<i64>,
    cap: usize,
    random: bool,
    rng: &mut R,
) -> Vec<i64> {
    candidates.sort_unstable();
    if candidates.len() > cap {
        if random {
            candidates = index::sample(rng, candidates.len(), cap)
                .into_iter()
                .map(|i| candidates[i])
                .collect();
            candidates.sort_unstable();
        } else {
            candidates.truncate(cap);
        }
    }
    candidates.reverse();
    candidates
}

/// Builds one wide-table column: for each product (in the canonical
/// descending order), look up its process step and that step's value.
/// Products without a step or without readings get NaN, never a dropped
/// row.
pub fn column_for_products(
    products_desc: &[i64],
    step_by_product: &HashMap<i64, i64>,
    value_by_step: &HashMap<i64, f64>,
) -> Vec<f64> {
    products_desc
        .iter()
        .map(|product| {
            step_by_product
                .get(product)
                .and_then(|step| value_by_step.get(step))
                .copied()
                .unwrap_or(f64::NAN)
        })
        .collect()
}

/// Pivots long-format target readings into one row per product with one
/// column per characteristic id. Absent (product, characteristic)
/// combinations are NaN-filled; when a product has several readings for
/// one characteristic the first (earliest, given input ordering) wins.
pub fn pivot_targets(rows: &[StackedReading]) -> FeatureTable {
    let mut kinds: Vec<i64> = rows.iter().map(|r| r.kind).collect();
    kinds.sort_unstable();
    kinds.dedup();

    // Products in appearance order; the query orders rows ascending by
    // product id.
    let mut products: Vec<i64> = Vec::new();
    for row in rows {
        if products.last() != Some(&row.product_id) && !products.contains(&row.product_id) {
            products.push(row.product_id);
        }
    }

    let mut cells: HashMap<(i64, i64), f64> = HashMap::new();
    for row in rows {
        cells.entry((row.product_id, row.kind)).or_insert(row.value);
    }

    let mut table = FeatureTable::new(products.clone());
    for kind in kinds {
        let values = products
            .iter()
            .map(|p| cells.get(&(*p, kind)).copied().unwrap_or(f64::NAN))
            .collect();
        table.push_column(kind.to_string(), values);
    }
    table
}

/// Store-backed feature assembler for one dataset build.
pub struct Assembler<'a> {
    store: &'a Store,
    reductions: &'a ReductionSet,
}

impl<'a> Assembler<'a> {
    pub fn new(store: &'a Store, reductions: &'a ReductionSet) -> Self {
        Self { store, reductions }
    }

    fn step_specification_of(&self, feature: &Feature, dataframe_id: i64) -> Result<i64, DatasetError> {
        feature
            .step_specification_id
            .ok_or_else(|| DatasetError::MissingRelation {
                id: dataframe_id,
                relation: format!("feature '{}' has no step specification", feature.name),
            })
    }

    /// Wide table of reduced feature columns: one `<feature><method>`
    /// column per (feature, method) pair, methods applied per process
    /// step, re-keyed by product.
    pub async fn reduced_feature_table(
        &self,
        dataframe_id: i64,
        products_desc: &[i64],
        features: &[Feature],
    ) -> Result<FeatureTable, DatasetError> {
        let mut table = FeatureTable::new(products_desc.to_vec());

        for feature in features {
            let step_spec = self.step_specification_of(feature, dataframe_id)?;
            let steps = self
                .store
                .steps_for_products(products_desc, step_spec)
                .await?;
            let step_ids: Vec<i64> = steps.iter().map(|(step, _)| *step).collect();
            let step_by_product: HashMap<i64, i64> =
                steps.iter().map(|(step, product)| (*product, *step)).collect();

            for &method in self.reductions.methods() {
                let aggregates = self
                    .store
                    .aggregate_readings(&step_ids, feature.kind, feature.id, method)
                    .await?;
                table.push_column(
                    format!("{}{}", feature.name, method.as_str()),
                    column_for_products(products_desc, &step_by_product, &aggregates),
                );
            }
        }
        Ok(table)
    }

    /// Wide table of target columns: the literal single reading of each
    /// target characteristic, named `<feature>` verbatim. No reduction.
    pub async fn target_table(
        &self,
        dataframe_id: i64,
        products_desc: &[i64],
        targets: &[Feature],
    ) -> Result<FeatureTable, DatasetError> {
        let mut table = FeatureTable::new(products_desc.to_vec());

        for target in targets {
            let step_spec = self.step_specification_of(target, dataframe_id)?;
            let steps = self
                .store
                .steps_for_products(products_desc, step_spec)
                .await?;
            let step_ids: Vec<i64> = steps.iter().map(|(step, _)| *step).collect();
            let step_by_product: HashMap<i64, i64> =
                steps.iter().map(|(step, product)| (*product, *step)).collect();

            let values = self.store.raw_target_values(&step_ids, target.id).await?;
            table.push_column(
                target.name.clone(),
                column_for_products(products_desc, &step_by_product, &values),
            );
        }
        Ok(table)
    }

    /// Long-format feature table for time-series output: one row per
    /// reading, columns id/time/kind/value.
    pub async fn stacked_feature_table(
        &self,
        dataframe_id: i64,
        products_desc: &[i64],
        features: &[Feature],
    ) -> Result<StackedTable, DatasetError> {
        let Some(first) = features.first() else {
            return Ok(StackedTable::default());
        };
        let step_spec = self.step_specification_of(first, dataframe_id)?;
        let ids: Vec<i64> = features.iter().map(|f| f.id).collect();
        let rows = self
            .store
            .stacked_readings(products_desc, step_spec, first.kind, &ids)
            .await?;
        Ok(StackedTable::new(rows))
    }

    /// Wide target table for time-series output: target readings pivoted
    /// to one row per product, one column per characteristic id.
    pub async fn stacked_target_table(
        &self,
        dataframe_id: i64,
        products_desc: &[i64],
        targets: &[Feature],
    ) -> Result<FeatureTable, DatasetError> {
        let Some(first) = targets.first() else {
            return Ok(FeatureTable::new(Vec::new()));
        };
        let step_spec = self.step_specification_of(first, dataframe_id)?;
        let ids: Vec<i64> = targets.iter().map(|t| t.id).collect();
        let rows = self
            .store
            .stacked_readings(products_desc, step_spec, FeatureKind::Characteristic, &ids)
            .await?;
        Ok(pivot_targets(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn fixed_rng() -> impl Rng {
        use rand::SeedableRng;
        rand::rngs::StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_select_products_no_cap_descending() {
        let picked = select_products(vec![4, 1, 3, 2], 10, false, &mut fixed_rng());
        assert_eq!(picked, vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_select_products_deterministic_cap_takes_lowest_ids() {
        let candidates: Vec<i64> = (1..=10).collect();
        let picked = select_products(candidates, 3, false, &mut fixed_rng());
        // Three lowest ids, emitted in descending order.
        assert_eq!(picked, vec![3, 2, 1]);
    }

    #[test]
    fn test_select_products_deterministic_is_repeatable() {
        let a = select_products(vec![9, 5, 7, 1, 3], 10, false, &mut fixed_rng());
        let b = select_products(vec![3, 1, 7, 5, 9], 10, false, &mut fixed_rng());
        assert_eq!(a, b);
    }

    #[test]
    fn test_select_products_random_sample_size_and_order() {
        let candidates: Vec<i64> = (1..=100).collect();
        let picked = select_products(candidates.clone(), 10, true, &mut fixed_rng());
        assert_eq!(picked.len(), 10);
        // Without replacement and still descending.
        let mut sorted = picked.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 10);
        let mut desc = picked.clone();
        desc.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(picked, desc);
    }

    #[test]
    fn test_column_for_products_missing_step_and_value() {
        let products = vec![3, 2, 1];
        let step_by_product: HashMap<i64, i64> = [(3, 30), (2, 20)].into_iter().collect();
        let value_by_step: HashMap<i64, f64> = [(30, 1.5)].into_iter().collect();

        let col = column_for_products(&products, &step_by_product, &value_by_step);
        assert_eq!(col[0], 1.5);
        assert!(col[1].is_nan()); // step without readings
        assert!(col[2].is_nan()); // product without step
        assert_eq!(col.len(), 3); // never a dropped row
    }

    fn reading(product: i64, kind: i64, value: f64, secs: u32) -> StackedReading {
        StackedReading {
            product_id: product,
            date: Utc.with_ymd_and_hms(2022, 5, 4, 8, 0, secs).unwrap(),
            kind,
            value,
        }
    }

    #[test]
    fn test_pivot_targets_fills_missing_combinations() {
        let rows = vec![
            reading(1, 10, 0.5, 0),
            reading(1, 11, 0.7, 0),
            reading(2, 10, 0.9, 0),
            // product 2 has no reading for characteristic 11
        ];
        let table = pivot_targets(&rows);
        assert_eq!(table.index(), &[1, 2]);
        assert_eq!(table.column_names(), vec!["10", "11"]);
        assert_eq!(table.value(1, "10"), Some(0.9));
        assert!(table.value(1, "11").unwrap().is_nan());
    }

    #[test]
    fn test_pivot_targets_first_reading_wins() {
        let rows = vec![reading(1, 10, 0.5, 0), reading(1, 10, 9.9, 1)];
        let table = pivot_targets(&rows);
        assert_eq!(table.value(0, "10"), Some(0.5));
    }

    #[test]
    fn test_pivot_targets_empty() {
        let table = pivot_targets(&[]);
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.num_columns(), 0);
    }
}
