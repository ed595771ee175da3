//! CK-014: BLAKE3 hashing of plans and field values.

use crate::core::fieldset::FieldSet;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash a slice of values by their little-endian bit patterns.
/// `-0.0` and `0.0` hash differently; NaN payloads are preserved.
pub fn hash_values(values: &[f64]) -> String {
    let mut hasher = blake3::Hasher::new();
    for v in values {
        hasher.update(&v.to_le_bytes());
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Hash one field of a field set (shape and values).
pub fn hash_field(fields: &FieldSet, name: &str) -> Result<String, String> {
    let field = fields.get(name)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(field.function_space.name.as_bytes());
    hasher.update(&(field.function_space.points as u64).to_le_bytes());
    hasher.update(&(field.levels as u64).to_le_bytes());
    for v in &field.values {
        hasher.update(&v.to_le_bytes());
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Composite hash over several component hashes, order-sensitive.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fieldset::FunctionSpace;

    #[test]
    fn test_ck014_hash_string() {
        let h = hash_string("hello");
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
        assert_eq!(h, hash_string("hello"));
        assert_ne!(h, hash_string("hello "));
    }

    #[test]
    fn test_ck014_hash_values_order_and_sign() {
        assert_eq!(hash_values(&[1.0, 2.0]), hash_values(&[1.0, 2.0]));
        assert_ne!(hash_values(&[1.0, 2.0]), hash_values(&[2.0, 1.0]));
        assert_ne!(hash_values(&[0.0]), hash_values(&[-0.0]));
    }

    #[test]
    fn test_ck014_hash_field_includes_shape() {
        let space = FunctionSpace::new("nodes", 2);
        let a = FieldSet::from_columns(&space, &[("t", 1, vec![1.0, 2.0])]);
        let b = FieldSet::from_columns(&FunctionSpace::new("nodes", 1), &[("t", 2, vec![1.0, 2.0])]);
        let ha = hash_field(&a, "t").unwrap();
        assert_ne!(ha, hash_field(&b, "t").unwrap());
        assert!(hash_field(&a, "missing").is_err());
    }

    #[test]
    fn test_ck014_composite_hash() {
        let h1 = composite_hash(&["a", "b"]);
        assert_eq!(h1, composite_hash(&["a", "b"]));
        assert_ne!(h1, composite_hash(&["b", "a"]));
        assert_ne!(composite_hash(&["ab"]), composite_hash(&["a", "b"]));
    }
}
