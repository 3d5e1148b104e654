//! Component property snapshots and the async source that feeds them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::units::{ComputedUnit, Quantity, UnitRegistry};
use crate::{Error, Result};

/// One property value as the surrounding product supplies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentProperty {
    pub component: String,
    pub property: String,
    pub value: f64,
    /// Registered unit symbol; absent means dimensionless.
    #[serde(default)]
    pub unit: Option<String>,
}

impl ComponentProperty {
    pub fn new(component: &str, property: &str, value: f64, unit: Option<&str>) -> Self {
        Self {
            component: component.to_string(),
            property: property.to_string(),
            value,
            unit: unit.map(str::to_string),
        }
    }
}

/// Where component properties come from (a registry service, a database, a file).
#[async_trait]
pub trait PropertySource: Send + Sync {
    async fn fetch_properties(&self) -> Result<Vec<ComponentProperty>>;
}

/// Immutable view of all component properties at one point in time.
#[derive(Debug, Clone)]
pub struct PropertySnapshot {
    values: HashMap<String, HashMap<String, Quantity>>,
    taken_at: DateTime<Utc>,
}

impl Default for PropertySnapshot {
    fn default() -> Self {
        Self { values: HashMap::new(), taken_at: Utc::now() }
    }
}

impl PropertySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from supplied values, resolving unit symbols against the registry.
    pub fn from_properties(properties: &[ComponentProperty], units: &UnitRegistry) -> Result<Self> {
        let mut snapshot = Self::new();
        for p in properties {
            let quantity = property_quantity(p, units)?;
            snapshot.insert(&p.component, &p.property, quantity);
        }
        Ok(snapshot)
    }

    pub fn insert(&mut self, component: &str, property: &str, quantity: Quantity) {
        self.values
            .entry(component.to_string())
            .or_default()
            .insert(property.to_string(), quantity);
    }

    pub fn remove(&mut self, component: &str, property: &str) -> Option<Quantity> {
        let props = self.values.get_mut(component)?;
        let removed = props.remove(property);
        if props.is_empty() {
            self.values.remove(component);
        }
        removed
    }

    pub fn get(&self, component: &str, property: &str) -> Option<&Quantity> {
        self.values.get(component)?.get(property)
    }

    pub fn has_component(&self, component: &str) -> bool {
        self.values.contains_key(component)
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.values.values().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(component, property)` pairs that were added, removed or changed
    /// between `self` (old) and `newer`, sorted.
    pub fn changed(&self, newer: &PropertySnapshot) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (component, props) in &newer.values {
            for (property, q) in props {
                if self.get(component, property) != Some(q) {
                    out.push((component.clone(), property.clone()));
                }
            }
        }
        for (component, props) in &self.values {
            for property in props.keys() {
                if newer.get(component, property).is_none() {
                    out.push((component.clone(), property.clone()));
                }
            }
        }
        out.sort();
        out
    }
}

pub(crate) fn property_quantity(p: &ComponentProperty, units: &UnitRegistry) -> Result<Quantity> {
    if !p.value.is_finite() {
        return Err(Error::ConstraintViolation(format!(
            "property {}.{} is not a finite number",
            p.component, p.property
        )));
    }
    let unit = match &p.unit {
        None => ComputedUnit::dimensionless(),
        Some(symbol) => {
            let unit = units.by_symbol(symbol).ok_or_else(|| {
                Error::NotFound(format!(
                    "unit '{symbol}' for property {}.{}",
                    p.component, p.property
                ))
            })?;
            ComputedUnit::from_unit(unit)
        }
    };
    Ok(Quantity::new(p.value, unit))
}
