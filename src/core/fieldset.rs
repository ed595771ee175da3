//! CK-005: In-memory field set that recipes read from and write to.
//!
//! Values are stored point-major: the value of `(point, level)` lives at
//! `point * levels + level`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Horizontal layout shared by fields defined on the same grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpace {
    pub name: String,
    pub points: usize,
}

impl FunctionSpace {
    pub fn new(name: impl Into<String>, points: usize) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// A single grid-shaped variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub function_space: FunctionSpace,
    pub levels: usize,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub metadata: IndexMap<String, serde_yaml_ng::Value>,
}

impl Field {
    /// A zero-filled field.
    pub fn zeros(function_space: FunctionSpace, levels: usize) -> Self {
        let len = function_space.points * levels;
        Self {
            function_space,
            levels,
            values: vec![0.0; len],
            metadata: IndexMap::new(),
        }
    }

    pub fn points(&self) -> usize {
        self.function_space.points
    }

    pub fn index(&self, point: usize, level: usize) -> usize {
        point * self.levels + level
    }

    pub fn at(&self, point: usize, level: usize) -> f64 {
        self.values[self.index(point, level)]
    }

    /// Check the value buffer matches the declared shape.
    pub fn check_shape(&self) -> Result<(), String> {
        let expected = self.points() * self.levels;
        if self.values.len() != expected {
            return Err(format!(
                "expected {} values ({} points x {} levels), found {}",
                expected,
                self.points(),
                self.levels,
                self.values.len()
            ));
        }
        Ok(())
    }
}

/// Named collection of fields, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    #[serde(default)]
    pub fields: IndexMap<String, Field>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Result<&Field, String> {
        self.fields
            .get(name)
            .ok_or_else(|| format!("field '{}' is not in the field set", name))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Field, String> {
        self.fields
            .get_mut(name)
            .ok_or_else(|| format!("field '{}' is not in the field set", name))
    }

    pub fn values(&self, name: &str) -> Result<&[f64], String> {
        Ok(&self.get(name)?.values)
    }

    pub fn values_mut(&mut self, name: &str) -> Result<&mut [f64], String> {
        Ok(&mut self.get_mut(name)?.values)
    }

    pub fn levels(&self, name: &str) -> Result<usize, String> {
        Ok(self.get(name)?.levels)
    }

    pub fn function_space(&self, name: &str) -> Result<&FunctionSpace, String> {
        Ok(&self.get(name)?.function_space)
    }

    /// Metadata value attached to a field, if both exist.
    pub fn metadata(&self, name: &str, key: &str) -> Option<&serde_yaml_ng::Value> {
        self.fields.get(name).and_then(|f| f.metadata.get(key))
    }

    /// Insert (or replace) a field.
    pub fn insert(&mut self, name: impl Into<String>, field: Field) {
        self.fields.insert(name.into(), field);
    }

    /// Create a zero-filled field unless one with that name already exists.
    /// An existing field keeps its values and shape.
    pub fn create(&mut self, name: &str, levels: usize, function_space: FunctionSpace) -> &mut Field {
        self.fields
            .entry(name.to_string())
            .or_insert_with(|| Field::zeros(function_space, levels))
    }

    /// Run `f` with mutable access to one field's values and shared access to
    /// the rest of the set.
    ///
    /// While `f` runs the target field's values read as empty through `rest`.
    pub fn with_values_mut<R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut [f64], &FieldSet) -> R,
    ) -> Result<R, String> {
        let mut values = std::mem::take(&mut self.get_mut(name)?.values);
        let out = f(&mut values, self);
        self.get_mut(name)?.values = values;
        Ok(out)
    }

    /// Build a field set from `(name, levels, values)` triples on one space.
    pub fn from_columns(space: &FunctionSpace, columns: &[(&str, usize, Vec<f64>)]) -> Self {
        let mut set = Self::new();
        for (name, levels, values) in columns {
            set.insert(
                *name,
                Field {
                    function_space: space.clone(),
                    levels: *levels,
                    values: values.clone(),
                    metadata: IndexMap::new(),
                },
            );
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> FunctionSpace {
        FunctionSpace::new("nodes", 2)
    }

    #[test]
    fn test_ck005_create_and_query() {
        let mut fs = FieldSet::new();
        assert!(!fs.has("t"));
        fs.create("t", 3, space());
        assert!(fs.has("t"));
        assert_eq!(fs.levels("t").unwrap(), 3);
        assert_eq!(fs.values("t").unwrap().len(), 6);
        assert_eq!(fs.function_space("t").unwrap().name, "nodes");
    }

    #[test]
    fn test_ck005_create_keeps_existing() {
        let mut fs = FieldSet::from_columns(&space(), &[("t", 1, vec![1.0, 2.0])]);
        fs.create("t", 5, space());
        assert_eq!(fs.levels("t").unwrap(), 1);
        assert_eq!(fs.values("t").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_ck005_point_major_index() {
        let fs = FieldSet::from_columns(&space(), &[("p", 3, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0])]);
        let f = fs.get("p").unwrap();
        assert_eq!(f.at(0, 2), 2.0);
        assert_eq!(f.at(1, 0), 10.0);
    }

    #[test]
    fn test_ck005_missing_field_error() {
        let fs = FieldSet::new();
        let err = fs.values("exner").unwrap_err();
        assert!(err.contains("'exner'"));
    }

    #[test]
    fn test_ck005_with_values_mut() {
        let mut fs = FieldSet::from_columns(
            &space(),
            &[("a", 1, vec![1.0, 2.0]), ("b", 1, vec![0.0, 0.0])],
        );
        fs.with_values_mut("b", |b, rest| {
            let a = rest.values("a").unwrap();
            for (bi, ai) in b.iter_mut().zip(a) {
                *bi = 2.0 * ai;
            }
        })
        .unwrap();
        assert_eq!(fs.values("b").unwrap(), &[2.0, 4.0]);
        assert_eq!(fs.values("a").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_ck005_metadata() {
        let mut fs = FieldSet::new();
        fs.create("rh", 1, space())
            .metadata
            .insert("cap_super_sat".to_string(), serde_yaml_ng::Value::Bool(true));
        assert_eq!(
            fs.metadata("rh", "cap_super_sat"),
            Some(&serde_yaml_ng::Value::Bool(true))
        );
        assert!(fs.metadata("rh", "other").is_none());
        assert!(fs.metadata("none", "cap_super_sat").is_none());
    }

    #[test]
    fn test_ck005_check_shape() {
        let mut f = Field::zeros(space(), 2);
        assert!(f.check_shape().is_ok());
        f.values.pop();
        assert!(f.check_shape().unwrap_err().contains("expected 4"));
    }

    #[test]
    fn test_ck005_yaml_roundtrip() {
        let fs = FieldSet::from_columns(&space(), &[("t", 1, vec![280.0, 290.5])]);
        let yaml = serde_yaml_ng::to_string(&fs).unwrap();
        let back: FieldSet = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, fs);
    }
}
