//! Cost post-pass: moves each filled instance to the cheapest template able to hold it.
//!
//! Contents are never repacked; only the template reference changes. Each
//! instance is visited exactly once.

use tracing::debug;

use crate::compat::can_fit_within;
use crate::model::{ContainerTemplate, CountryOverrides};
use crate::packer::InstanceLoad;

/// Replaces instance templates with strictly cheaper compatible ones.
///
/// # Parameters
/// * `instances` - All packed instances of the run
/// * `templates` - Every template known to the run
/// * `overrides` - Country-specific cost and weight limits
/// * `utilization_ceiling` - Highest utilization a substitute may reach
///
/// # Returns
/// Number of instances that received a cheaper template.
pub fn downsize(
    instances: &mut [InstanceLoad],
    templates: &[ContainerTemplate],
    overrides: &CountryOverrides,
    utilization_ceiling: f64,
) -> usize {
    let mut substitutions = 0;
    for load in instances.iter_mut() {
        if load.pinned || load.assigned.is_empty() {
            continue;
        }
        let Some(replacement) = cheapest_substitute(load, templates, overrides, utilization_ceiling)
        else {
            continue;
        };
        debug!(
            instance = %load.instance.id,
            from = %load.template().id,
            to = %replacement.id,
            "downsized container instance"
        );
        load.retemplate(replacement.clone());
        substitutions += 1;
    }
    substitutions
}

fn cheapest_substitute<'a>(
    load: &InstanceLoad,
    templates: &'a [ContainerTemplate],
    overrides: &CountryOverrides,
    utilization_ceiling: f64,
) -> Option<&'a ContainerTemplate> {
    let country = load.country();
    let current = load.template();
    let current_cost = overrides.cost_for(current, country);
    let destination = current.normalized_destination();

    let mut best: Option<(&ContainerTemplate, f64)> = None;
    for candidate in templates {
        if candidate.id == current.id || candidate.normalized_destination() != destination {
            continue;
        }
        let cost = overrides.cost_for(candidate, country);
        if cost >= current_cost {
            continue;
        }
        if best.is_some_and(|(_, best_cost)| cost >= best_cost) {
            continue;
        }
        let limit = overrides.weight_limit_for(candidate, country);
        if can_fit_within(&load.assigned, candidate, limit, utilization_ceiling) {
            best = Some((candidate, cost));
        }
    }
    best.map(|(template, _)| template)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{CountryTable, Product};
    use crate::types::OVERFILL_LIMIT;

    fn template(id: &str, capacity: u32, cost: f64) -> ContainerTemplate {
        ContainerTemplate::new(id, id)
            .with_capacity("IBC1000", capacity)
            .with_cost(cost)
            .with_destination("DE")
    }

    fn loaded(template: &ContainerTemplate, qty: u64) -> InstanceLoad {
        let mut load = InstanceLoad::new(template.instantiate("c-1".to_string()));
        load.push(
            Product::new("p", "p", "IBC1000", qty)
                .unwrap()
                .with_destination("DE")
                .with_country("DE"),
        );
        load
    }

    #[test]
    fn picks_cheapest_template_that_still_fits() {
        let templates = vec![
            template("large", 100, 1000.0),
            template("medium", 50, 600.0),
            template("small", 20, 300.0),
        ];
        let mut instances = vec![loaded(&templates[0], 30)];
        let count = downsize(
            &mut instances,
            &templates,
            &CountryOverrides::default(),
            OVERFILL_LIMIT,
        );
        assert_eq!(count, 1);
        assert_eq!(instances[0].template().id, "medium");
        assert!((instances[0].utilization - 60.0).abs() < 1e-9);
    }

    #[test]
    fn keeps_template_when_nothing_cheaper_fits() {
        let templates = vec![template("large", 100, 1000.0), template("small", 20, 300.0)];
        let mut instances = vec![loaded(&templates[0], 90)];
        let count = downsize(
            &mut instances,
            &templates,
            &CountryOverrides::default(),
            OVERFILL_LIMIT,
        );
        assert_eq!(count, 0);
        assert_eq!(instances[0].template().id, "large");
    }

    #[test]
    fn requires_same_destination() {
        let templates = vec![
            template("large", 100, 1000.0),
            template("anywhere", 100, 10.0).with_destination(""),
            template("france", 100, 10.0).with_destination("FR"),
        ];
        let mut instances = vec![loaded(&templates[0], 10)];
        downsize(
            &mut instances,
            &templates,
            &CountryOverrides::default(),
            OVERFILL_LIMIT,
        );
        assert_eq!(instances[0].template().id, "large");
    }

    #[test]
    fn uses_country_costs() {
        let templates = vec![template("large", 100, 1000.0), template("medium", 50, 600.0)];
        let mut costs = CountryTable::new();
        costs.insert(
            "DE".to_string(),
            BTreeMap::from([("medium".to_string(), 1500.0)]),
        );
        let overrides = CountryOverrides::new(costs, CountryTable::new());
        let mut instances = vec![loaded(&templates[0], 10)];
        assert_eq!(downsize(&mut instances, &templates, &overrides, OVERFILL_LIMIT), 0);
    }

    #[test]
    fn respects_utilization_ceiling() {
        let templates = vec![template("large", 100, 1000.0), template("medium", 50, 600.0)];
        let mut instances = vec![loaded(&templates[0], 45)];
        assert_eq!(
            downsize(&mut instances, &templates, &CountryOverrides::default(), 80.1),
            0
        );
    }

    #[test]
    fn leaves_pinned_instances_alone() {
        let templates = vec![template("large", 100, 1000.0), template("small", 50, 100.0)];
        let mut load = InstanceLoad::pinned(templates[0].instantiate("booked".to_string()));
        load.push(Product::new("p", "p", "IBC1000", 5).unwrap().with_destination("DE"));
        let mut instances = vec![load];
        downsize(
            &mut instances,
            &templates,
            &CountryOverrides::default(),
            OVERFILL_LIMIT,
        );
        assert_eq!(instances[0].template().id, "large");
    }
}
