//! Dataset Builder job: drives the assembler for one persisted DataFrame
//! specification and owns its status contract.
//!
//! Status contract: Running at start, Succeeded on completion. Failed when
//! an unsupported reduction method was supplied or when neither a feature
//! table nor a target table could be built; any other error also flips the
//! status to Failed and then propagates. Artifacts already written before
//! a failure are not rolled back.

use std::path::Path;

use tracing::{info, warn};

use super::assembler::{select_products, Assembler, Feature};
use super::table::FeatureTable;
use crate::error::DatasetError;
use crate::model::{DataFrameSpec, ReductionSet, RunStatus};
use crate::store::Store;

/// Artifact filename for the feature table.
pub const FEATURES_ARTIFACT: &str = "features.parquet";
/// Artifact filename for the target table.
pub const TARGETS_ARTIFACT: &str = "targets.parquet";

/// Builds the feature/target dataset for one DataFrame specification.
pub struct DatasetBuilder<'a> {
    store: &'a Store,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Runs the build. `product_ids` overrides candidate resolution when
    /// given. Idempotent per at-least-once dispatch: re-running overwrites
    /// the artifacts and re-derives the status.
    pub async fn run(
        &self,
        dataframe_id: i64,
        methods: &[String],
        product_ids: Option<Vec<i64>>,
    ) -> Result<(), DatasetError> {
        let reductions = match ReductionSet::parse(methods) {
            Ok(r) => r,
            Err(e) => {
                self.store
                    .update_dataframe_status(dataframe_id, RunStatus::Failed)
                    .await?;
                return Err(e);
            }
        };

        self.store
            .update_dataframe_status(dataframe_id, RunStatus::Running)
            .await?;

        match self.build(dataframe_id, &reductions, product_ids).await {
            Ok(()) => {
                self.store
                    .update_dataframe_status(dataframe_id, RunStatus::Succeeded)
                    .await?;
                info!(tenant = %self.store.tenant(), dataframe_id, "Dataset build succeeded");
                Ok(())
            }
            Err(e) => {
                warn!(tenant = %self.store.tenant(), dataframe_id, error = %e, "Dataset build failed");
                self.store
                    .update_dataframe_status(dataframe_id, RunStatus::Failed)
                    .await?;
                Err(e)
            }
        }
    }

    async fn build(
        &self,
        dataframe_id: i64,
        reductions: &ReductionSet,
        product_ids: Option<Vec<i64>>,
    ) -> Result<(), DatasetError> {
        let spec = self.store.load_dataframe(dataframe_id).await?;
        let save_path = spec
            .save_path
            .clone()
            .ok_or(DatasetError::NoSavePath(dataframe_id))?;
        let save_dir = Path::new(&save_path);

        let products_desc = self.resolve_products(&spec, product_ids).await?;

        let parameters: Vec<Feature> = self
            .store
            .parameters_by_ids(&spec.parameter_ids)
            .await?
            .into_iter()
            .map(Feature::from)
            .collect();
        let characteristics: Vec<Feature> = self
            .store
            .characteristics_by_ids(&spec.characteristic_ids)
            .await?
            .into_iter()
            .map(Feature::from)
            .collect();
        let targets: Vec<Feature> = self
            .store
            .characteristics_by_ids(&spec.target_ids)
            .await?
            .into_iter()
            .map(Feature::from)
            .collect();

        let assembler = Assembler::new(self.store, reductions);

        if !reductions.is_stacked() {
            let parameter_table = if parameters.is_empty() {
                None
            } else {
                Some(
                    assembler
                        .reduced_feature_table(dataframe_id, &products_desc, &parameters)
                        .await?,
                )
            };
            let characteristic_table = if characteristics.is_empty() {
                None
            } else {
                Some(
                    assembler
                        .reduced_feature_table(dataframe_id, &products_desc, &characteristics)
                        .await?,
                )
            };
            let target_table = if targets.is_empty() {
                None
            } else {
                Some(
                    assembler
                        .target_table(dataframe_id, &products_desc, &targets)
                        .await?,
                )
            };

            let feature_table = merge_feature_tables(parameter_table, characteristic_table)?;
            let (Some(feature_table), Some(target_table)) = (feature_table, target_table) else {
                return Err(DatasetError::EmptyResult(
                    "a feature set and a target set are both required".to_string(),
                ));
            };

            feature_table.write_parquet(save_dir, FEATURES_ARTIFACT)?;
            target_table.write_parquet(save_dir, TARGETS_ARTIFACT)?;
        } else {
            // Quality characteristics are not time series; only process
            // parameters contribute stacked feature rows.
            let feature_table = if parameters.is_empty() {
                None
            } else {
                Some(
                    assembler
                        .stacked_feature_table(dataframe_id, &products_desc, &parameters)
                        .await?,
                )
            };
            let target_table = if targets.is_empty() {
                None
            } else {
                Some(
                    assembler
                        .stacked_target_table(dataframe_id, &products_desc, &targets)
                        .await?,
                )
            };

            let (Some(feature_table), Some(target_table)) = (feature_table, target_table) else {
                return Err(DatasetError::EmptyResult(
                    "a feature set and a target set are both required".to_string(),
                ));
            };

            feature_table.write_parquet(save_dir, FEATURES_ARTIFACT)?;
            target_table.write_parquet(save_dir, TARGETS_ARTIFACT)?;
        }

        Ok(())
    }

    async fn resolve_products(
        &self,
        spec: &DataFrameSpec,
        override_ids: Option<Vec<i64>>,
    ) -> Result<Vec<i64>, DatasetError> {
        let candidates = match override_ids {
            Some(ids) if !ids.is_empty() => ids,
            _ => {
                let product_spec_id =
                    spec.product_specification_id
                        .ok_or(DatasetError::MissingRelation {
                            id: spec.id,
                            relation: "product specification".to_string(),
                        })?;
                self.store
                    .candidate_product_ids(product_spec_id, &spec.step_specification_ids)
                    .await?
            }
        };
        let cap = usize::try_from(spec.product_amount).unwrap_or(usize::MAX);
        Ok(select_products(
            candidates,
            cap,
            spec.random_records,
            &mut rand::rng(),
        ))
    }
}

/// Joins the parameter and characteristic feature tables on the shared
/// product index when both exist.
fn merge_feature_tables(
    left: Option<FeatureTable>,
    right: Option<FeatureTable>,
) -> Result<Option<FeatureTable>, DatasetError> {
    match (left, right) {
        (Some(l), Some(r)) => Ok(Some(l.join(r)?)),
        (Some(l), None) => Ok(Some(l)),
        (None, Some(r)) => Ok(Some(r)),
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(index: Vec<i64>, columns: &[(&str, Vec<f64>)]) -> FeatureTable {
        let mut t = FeatureTable::new(index);
        for (name, values) in columns {
            t.push_column(*name, values.clone());
        }
        t
    }

    #[test]
    fn test_merge_both_tables_column_count() {
        // Two parameters x two methods on one side, one characteristic x
        // two methods on the other: 4 + 2 = 6 feature columns total.
        let params = table(
            vec![3, 2, 1],
            &[
                ("speedMin", vec![1.0, 2.0, 3.0]),
                ("speedMax", vec![1.0, 2.0, 3.0]),
                ("feedMin", vec![1.0, 2.0, 3.0]),
                ("feedMax", vec![1.0, 2.0, 3.0]),
            ],
        );
        let chars = table(
            vec![3, 2, 1],
            &[
                ("roughnessMin", vec![0.1, 0.2, 0.3]),
                ("roughnessMax", vec![0.1, 0.2, 0.3]),
            ],
        );
        let merged = merge_feature_tables(Some(params), Some(chars))
            .unwrap()
            .unwrap();
        assert_eq!(merged.num_columns(), 6);
        assert_eq!(merged.index(), &[3, 2, 1]);
    }

    #[test]
    fn test_merge_single_side_passthrough() {
        let only = table(vec![1], &[("speedAvg", vec![5.0])]);
        let merged = merge_feature_tables(Some(only.clone()), None).unwrap();
        assert_eq!(merged, Some(only));
        assert_eq!(merge_feature_tables(None, None).unwrap(), None);
    }

    #[test]
    fn test_merge_index_mismatch_is_error() {
        let l = table(vec![2, 1], &[("a", vec![1.0, 2.0])]);
        let r = table(vec![3, 1], &[("b", vec![1.0, 2.0])]);
        assert!(merge_feature_tables(Some(l), Some(r)).is_err());
    }
}
