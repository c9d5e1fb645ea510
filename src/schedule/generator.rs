use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{LoanError, Result};
use crate::types::InterestMethod;

use super::{DecliningBalanceScheduleGenerator, FlatScheduleGenerator, LoanSchedule, ScheduleGenerationInput};

/// builds a full schedule for one interest method.
///
/// implementations are stateless: identical input gives an identical schedule.
pub trait ScheduleGenerator: Send + Sync {
    fn interest_method(&self) -> InterestMethod;

    fn generate(&self, input: &ScheduleGenerationInput) -> Result<LoanSchedule>;
}

/// lookup table from interest method to generator
#[derive(Clone)]
pub struct ScheduleGeneratorFactory {
    generators: BTreeMap<InterestMethod, Arc<dyn ScheduleGenerator>>,
}

impl ScheduleGeneratorFactory {
    /// empty table
    pub fn empty() -> Self {
        Self {
            generators: BTreeMap::new(),
        }
    }

    /// flat and declining balance registered
    pub fn standard() -> Self {
        let mut factory = Self::empty();
        factory.register(Arc::new(FlatScheduleGenerator));
        factory.register(Arc::new(DecliningBalanceScheduleGenerator));
        factory
    }

    /// register (or replace) the generator for its interest method
    pub fn register(&mut self, generator: Arc<dyn ScheduleGenerator>) {
        self.generators.insert(generator.interest_method(), generator);
    }

    pub fn create(&self, method: InterestMethod) -> Result<Arc<dyn ScheduleGenerator>> {
        self.generators
            .get(&method)
            .cloned()
            .ok_or(LoanError::UnsupportedInterestMethod { method })
    }

    /// look up the generator and build the schedule
    pub fn generate(&self, method: InterestMethod, input: &ScheduleGenerationInput) -> Result<LoanSchedule> {
        let generator = self.create(method)?;
        let schedule = generator.generate(input)?;
        debug!(
            ?method,
            installments = schedule.installments.len(),
            principal = %input.principal,
            "generated loan schedule"
        );
        Ok(schedule)
    }

    pub fn supported_methods(&self) -> Vec<InterestMethod> {
        self.generators.keys().copied().collect()
    }
}

impl Default for ScheduleGeneratorFactory {
    fn default() -> Self {
        Self::standard()
    }
}
