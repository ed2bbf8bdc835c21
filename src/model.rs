//! Data models for the load planning engine.
//!
//! This module defines the value types the engine consumes and produces:
//! - `Product`: a cargo line-item requiring a form factor capacity
//! - `ContainerTemplate`: a reusable container definition
//! - `ContainerInstance`: one materialized copy of a template
//! - `LoadedContainer`: a finalized instance with its contents and issues
//! - `CountryOverrides`: per-country cost and weight-limit tables
//! - `OptimizationSettings`: knobs for a single optimization call

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{
    UNIT_EPSILON, normalize_destination, normalize_tag, parse_optional_date, validation,
};

/// Validation error for input records, raised before any packing happens.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid product '{id}': {reason}")]
    InvalidProduct { id: String, reason: String },
    #[error("Invalid container template '{id}': {reason}")]
    InvalidTemplate { id: String, reason: String },
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

/// How an upstream system marked an existing container assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    /// A binding booking the engine must keep.
    Hard,
    /// A suggestion from an earlier planning run; free to be replanned.
    Suggested,
}

/// Pre-existing container assignment attached to a product by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CurrentAssignment {
    /// Free-text container description, matched against template names and ids.
    pub container: String,
    /// Booking reference grouping products into the same physical container.
    pub reference: String,
    pub kind: AssignmentKind,
}

impl CurrentAssignment {
    /// Returns `true` if the assignment must be honoured as-is.
    pub fn is_hard(&self) -> bool {
        self.kind == AssignmentKind::Hard
            && !self.container.trim().is_empty()
            && !self.reference.trim().is_empty()
    }
}

/// A cargo line-item to be planned.
///
/// `weight` is the total weight of the line, not a per-unit weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "p-1",
    "name": "Solvent A",
    "form_factor_id": "IBC1000",
    "quantity": 12,
    "weight": 11400.0,
    "destination": "DE",
    "country": "DE",
    "restrictions": ["hazmat"]
}))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub form_factor_id: String,
    pub quantity: u64,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub restrictions: BTreeSet<String>,
    #[serde(default)]
    pub ready_date: Option<String>,
    #[serde(default)]
    pub ship_deadline: Option<String>,
    #[serde(default)]
    pub arrival_deadline: Option<String>,
    #[serde(default)]
    pub shipping_available_by: Option<String>,
    /// Id of the original line this fragment was split from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_assignment: Option<CurrentAssignment>,
}

impl Product {
    /// Creates a new product line with validation.
    ///
    /// # Examples
    /// ```
    /// use load_planner::model::Product;
    ///
    /// assert!(Product::new("p-1", "Solvent", "IBC1000", 4).is_ok());
    /// assert!(Product::new("p-2", "Solvent", "IBC1000", 0).is_err());
    /// ```
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        form_factor_id: impl Into<String>,
        quantity: u64,
    ) -> Result<Self, ValidationError> {
        let product = Self {
            id: id.into(),
            name: name.into(),
            form_factor_id: form_factor_id.into(),
            quantity,
            weight: None,
            destination: String::new(),
            country: String::new(),
            restrictions: BTreeSet::new(),
            ready_date: None,
            ship_deadline: None,
            arrival_deadline: None,
            shipping_available_by: None,
            parent_id: None,
            current_assignment: None,
        };
        product.validate()?;
        Ok(product)
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_restriction(mut self, restriction: impl Into<String>) -> Self {
        self.restrictions.insert(restriction.into());
        self
    }

    pub fn with_ready_date(mut self, date: impl Into<String>) -> Self {
        self.ready_date = Some(date.into());
        self
    }

    pub fn with_ship_deadline(mut self, date: impl Into<String>) -> Self {
        self.ship_deadline = Some(date.into());
        self
    }

    pub fn with_arrival_deadline(mut self, date: impl Into<String>) -> Self {
        self.arrival_deadline = Some(date.into());
        self
    }

    pub fn with_shipping_available_by(mut self, date: impl Into<String>) -> Self {
        self.shipping_available_by = Some(date.into());
        self
    }

    pub fn with_current_assignment(mut self, assignment: CurrentAssignment) -> Self {
        self.current_assignment = Some(assignment);
        self
    }

    /// Checks the boundary invariants of a product line.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidProduct {
            id: self.id.clone(),
            reason,
        };
        validation::validate_identifier(&self.id, "Product id").map_err(invalid)?;
        validation::validate_identifier(&self.form_factor_id, "Form factor id")
            .map_err(invalid)?;
        if self.quantity == 0 {
            return Err(invalid("Quantity must be positive, got: 0".to_string()));
        }
        if let Some(weight) = self.weight {
            validation::validate_weight(weight).map_err(invalid)?;
        }
        Ok(())
    }

    /// Weight per unit, `0.0` when the line carries no weight.
    pub fn unit_weight(&self) -> f64 {
        match self.weight {
            Some(weight) if self.quantity > 0 => weight / self.quantity as f64,
            _ => 0.0,
        }
    }

    /// Weight counted towards container limits.
    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(0.0)
    }

    /// The id of the original line, following split lineage.
    pub fn lineage_id(&self) -> &str {
        self.parent_id.as_deref().unwrap_or(&self.id)
    }

    pub fn normalized_destination(&self) -> String {
        normalize_destination(&self.destination)
    }

    /// Restriction tags after normalization, empty tags removed.
    pub fn normalized_restrictions(&self) -> BTreeSet<String> {
        normalized_tags(&self.restrictions)
    }

    pub fn ready(&self) -> Option<NaiveDate> {
        parse_optional_date(self.ready_date.as_deref())
    }

    pub fn ship_deadline_date(&self) -> Option<NaiveDate> {
        parse_optional_date(self.ship_deadline.as_deref())
    }

    pub fn arrival_deadline_date(&self) -> Option<NaiveDate> {
        parse_optional_date(self.arrival_deadline.as_deref())
    }

    pub fn shipping_available_date(&self) -> Option<NaiveDate> {
        parse_optional_date(self.shipping_available_by.as_deref())
    }

    /// Creates a fresh fragment of this line with a new identity.
    ///
    /// The fragment keeps name and form factor, points back to the original
    /// line through `parent_id` and carries the pro-rated weight.
    pub fn fragment(&self, id: String, quantity: u64) -> Self {
        let weight = self
            .weight
            .map(|_| self.unit_weight() * quantity as f64);
        Self {
            id,
            quantity,
            weight,
            parent_id: Some(self.lineage_id().to_string()),
            ..self.clone()
        }
    }
}

/// A reusable container definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "t-40hc",
    "name": "40ft High Cube",
    "capacities": { "IBC1000": 20, "DRUM200": 80 },
    "cost": 2400.0,
    "transit_time_days": 14,
    "available_from": "2024-05-10",
    "destination": "DE",
    "restrictions": ["hazmat"],
    "max_weight": 26000.0
}))]
pub struct ContainerTemplate {
    pub id: String,
    pub name: String,
    /// Maximum units per form factor.
    pub capacities: BTreeMap<String, u32>,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub transit_time_days: u32,
    #[serde(default)]
    pub available_from: Option<String>,
    /// Empty destination acts as a wildcard.
    #[serde(default)]
    pub destination: String,
    /// Capabilities offered by the container.
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub restrictions: BTreeSet<String>,
    /// Default weight limit, overridable per country.
    #[serde(default)]
    pub max_weight: Option<f64>,
}

impl ContainerTemplate {
    /// Creates an empty template; capacities and attributes are added with the `with_*` methods.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capacities: BTreeMap::new(),
            cost: 0.0,
            transit_time_days: 0,
            available_from: None,
            destination: String::new(),
            restrictions: BTreeSet::new(),
            max_weight: None,
        }
    }

    pub fn with_capacity(mut self, form_factor_id: impl Into<String>, units: u32) -> Self {
        self.capacities.insert(form_factor_id.into(), units);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_transit_time_days(mut self, days: u32) -> Self {
        self.transit_time_days = days;
        self
    }

    pub fn with_available_from(mut self, date: impl Into<String>) -> Self {
        self.available_from = Some(date.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_restriction(mut self, restriction: impl Into<String>) -> Self {
        self.restrictions.insert(restriction.into());
        self
    }

    pub fn with_max_weight(mut self, max_weight: f64) -> Self {
        self.max_weight = Some(max_weight);
        self
    }

    /// Checks the boundary invariants of a template.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidTemplate {
            id: self.id.clone(),
            reason,
        };
        validation::validate_identifier(&self.id, "Template id").map_err(invalid)?;
        validation::validate_cost(self.cost).map_err(invalid)?;
        if let Some(max_weight) = self.max_weight {
            validation::validate_positive(max_weight, "Weight limit").map_err(invalid)?;
        }
        Ok(())
    }

    /// Positive unit capacity for a form factor, `None` if unsupported.
    pub fn capacity_for(&self, form_factor_id: &str) -> Option<u32> {
        self.capacities
            .get(form_factor_id)
            .copied()
            .filter(|units| *units > 0)
    }

    /// Percentage of this template one unit of the form factor consumes.
    pub fn unit_share(&self, form_factor_id: &str) -> Option<f64> {
        self.capacity_for(form_factor_id)
            .map(|units| 100.0 / units as f64)
    }

    /// Whole units of a form factor that fit below the given utilization ceiling.
    pub fn units_within(&self, form_factor_id: &str, utilization_ceiling: f64) -> u64 {
        match self.capacity_for(form_factor_id) {
            Some(units) => {
                let fitting = units as f64 * utilization_ceiling / 100.0 + UNIT_EPSILON;
                fitting.max(0.0).floor() as u64
            }
            None => 0,
        }
    }

    /// Total units across all form factors; used to rank templates by size.
    pub fn capacity_score(&self) -> u64 {
        self.capacities.values().map(|units| *units as u64).sum()
    }

    pub fn normalized_destination(&self) -> String {
        normalize_destination(&self.destination)
    }

    pub fn normalized_restrictions(&self) -> BTreeSet<String> {
        normalized_tags(&self.restrictions)
    }

    /// Departure date, i.e. the date the container becomes available.
    pub fn departure(&self) -> Option<NaiveDate> {
        parse_optional_date(self.available_from.as_deref())
    }

    /// Expected arrival: departure plus transit time.
    pub fn arrival(&self) -> Option<NaiveDate> {
        self.departure()
            .map(|date| date + Duration::days(self.transit_time_days as i64))
    }

    /// Materializes an empty instance of this template.
    pub fn instantiate(&self, id: String) -> ContainerInstance {
        ContainerInstance {
            id,
            template: self.clone(),
        }
    }
}

fn normalized_tags(tags: &BTreeSet<String>) -> BTreeSet<String> {
    tags.iter()
        .map(|tag| normalize_tag(tag))
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// One concrete copy of a template, materialized during packing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContainerInstance {
    pub id: String,
    pub template: ContainerTemplate,
}

/// A finalized container with its contents.
///
/// Built exclusively by the finalizer so utilization, weight and issues are
/// always derived from the assigned products.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct LoadedContainer {
    pub container: ContainerInstance,
    pub assigned_products: Vec<Product>,
    /// Sum of per-fragment capacity shares in percent.
    pub total_utilization: f64,
    pub total_weight: f64,
    pub validation_issues: Vec<String>,
}

impl LoadedContainer {
    /// Returns `true` if the finalizer found nothing to report.
    pub fn is_valid(&self) -> bool {
        self.validation_issues.is_empty()
    }

    /// Total units loaded into this container.
    pub fn total_units(&self) -> u64 {
        self.assigned_products.iter().map(|p| p.quantity).sum()
    }
}

/// `country -> template id -> value` override table.
pub type CountryTable = BTreeMap<String, BTreeMap<String, f64>>;

/// Country-specific overrides for template cost and weight limits.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CountryOverrides {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub costs: CountryTable,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub weight_limits: CountryTable,
}

impl CountryOverrides {
    pub fn new(costs: CountryTable, weight_limits: CountryTable) -> Self {
        Self {
            costs,
            weight_limits,
        }
    }

    /// Cost of a template when shipping for the given country.
    pub fn cost_for(&self, template: &ContainerTemplate, country: &str) -> f64 {
        lookup(&self.costs, country, &template.id).unwrap_or(template.cost)
    }

    /// Weight limit of a template for the given country, if any applies.
    pub fn weight_limit_for(&self, template: &ContainerTemplate, country: &str) -> Option<f64> {
        lookup(&self.weight_limits, country, &template.id).or(template.max_weight)
    }
}

fn lookup(table: &CountryTable, country: &str, template_id: &str) -> Option<f64> {
    let country = country.trim();
    if country.is_empty() {
        return None;
    }
    let per_template = table.get(country).or_else(|| {
        table
            .iter()
            .find(|(code, _)| code.trim().eq_ignore_ascii_case(country))
            .map(|(_, entries)| entries)
    })?;
    per_template.get(template_id).copied()
}

/// Settings for a single optimization call.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OptimizationSettings {
    /// Packing ceiling in percent of a container's capacity.
    pub max_utilization: f64,
    pub allow_unit_splitting: bool,
    /// Cluster products by `shipping_available_by` within this many days.
    pub shipping_date_grouping_range_days: Option<u32>,
    pub respect_current_assignments: bool,
}

impl OptimizationSettings {
    pub const DEFAULT_MAX_UTILIZATION: f64 = 100.0;
    pub const DEFAULT_ALLOW_UNIT_SPLITTING: bool = true;
    pub const DEFAULT_RESPECT_CURRENT_ASSIGNMENTS: bool = false;

    /// Creates a builder for custom settings.
    pub fn builder() -> OptimizationSettingsBuilder {
        OptimizationSettingsBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_positive(self.max_utilization, "Max utilization")
            .map_err(ValidationError::InvalidSettings)
    }
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            max_utilization: Self::DEFAULT_MAX_UTILIZATION,
            allow_unit_splitting: Self::DEFAULT_ALLOW_UNIT_SPLITTING,
            shipping_date_grouping_range_days: None,
            respect_current_assignments: Self::DEFAULT_RESPECT_CURRENT_ASSIGNMENTS,
        }
    }
}

/// Builder for `OptimizationSettings`.
#[derive(Clone, Debug, Default)]
pub struct OptimizationSettingsBuilder {
    settings: OptimizationSettings,
}

impl OptimizationSettingsBuilder {
    pub fn max_utilization(mut self, percent: f64) -> Self {
        self.settings.max_utilization = percent;
        self
    }

    pub fn allow_unit_splitting(mut self, allow: bool) -> Self {
        self.settings.allow_unit_splitting = allow;
        self
    }

    pub fn shipping_date_grouping_range_days(mut self, days: Option<u32>) -> Self {
        self.settings.shipping_date_grouping_range_days = days;
        self
    }

    pub fn respect_current_assignments(mut self, respect: bool) -> Self {
        self.settings.respect_current_assignments = respect;
        self
    }

    pub fn build(self) -> OptimizationSettings {
        self.settings
    }
}
