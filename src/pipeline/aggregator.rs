use std::sync::Arc;

use chrono::Local;
use serde_json::json;

use crate::error::CycleError;
use crate::logging;
use crate::model::{Quantity, Sample};

use super::RateLimitedFetcher;

/// Builds complete samples. Quantities are fetched in configured order and
/// the first absent value voids the whole sample; later quantities are not
/// requested at all.
pub struct SampleAggregator {
    fetcher: Arc<RateLimitedFetcher>,
    quantities: Vec<Quantity>,
}

impl SampleAggregator {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, quantities: Vec<Quantity>) -> Self {
        Self {
            fetcher,
            quantities,
        }
    }

    pub fn quantities(&self) -> &[Quantity] {
        &self.quantities
    }

    pub async fn aggregate(&self) -> Result<Sample, CycleError> {
        let mut values = Vec::with_capacity(self.quantities.len());

        for quantity in &self.quantities {
            match self.fetcher.fetch(quantity).await {
                Some(value) => values.push((quantity.label.clone(), value)),
                None => {
                    logging::warn(
                        "sample.voided",
                        "Sample voided, a quantity could not be fetched",
                        json!({
                            "missing": quantity.label,
                            "fetched": values.len(),
                            "expected": self.quantities.len(),
                        }),
                    );
                    return Err(CycleError::PartialAggregation {
                        missing: quantity.label.clone(),
                    });
                }
            }
        }

        Ok(Sample::new(Local::now().naive_local(), values))
    }
}
