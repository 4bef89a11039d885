//! The contract every stored item satisfies.

use std::fmt::Debug;
use std::hash::Hash;

/// An item that can be stored in a [`SectionedModel`](crate::SectionedModel).
///
/// Entities are value types. The model stores its own copies and mutates
/// them by replacement or through [`update_from`](Entity::update_from); it
/// never aliases caller-owned values.
///
/// Identity is decided purely by [`unique_value`](Entity::unique_value): two
/// entities with the same unique value are the same logical item, whatever
/// their other fields contain.
///
/// Most types derive this trait:
///
/// ```
/// use horizon_sections::Entity;
///
/// #[derive(Debug, Clone, Entity)]
/// struct Contact {
///     #[entity(id)]
///     id: u64,
///     #[entity(key)]
///     name: String,
///     #[entity(key = "country")]
///     country_code: String,
/// }
///
/// let contact = Contact { id: 7, name: "Ada".into(), country_code: "GB".into() };
/// assert_eq!(contact.unique_value(), 7);
/// assert_eq!(contact.field("country").as_deref(), Some("GB"));
/// assert_eq!(contact.field("missing"), None);
/// ```
pub trait Entity: Clone + Send + Sync + 'static {
    /// The stable identity type.
    type Id: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// The identity of this entity. Must not change while the entity is
    /// stored unless the change goes through the model's `update`.
    fn unique_value(&self) -> Self::Id;

    /// Keyed string accessor used to derive section names.
    ///
    /// Returns `None` for keys the entity does not recognize.
    fn field(&self, key: &str) -> Option<String> {
        let _ = key;
        None
    }

    /// Copy the mutable fields of a freshly fetched duplicate into `self`.
    ///
    /// Identity must be left untouched.
    fn update_from(&mut self, other: &Self);

    /// Returns `true` if both values are the same logical entity.
    fn same_entity(&self, other: &Self) -> bool {
        self.unique_value() == other.unique_value()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::person;
    use super::*;

    #[test]
    fn test_same_entity_uses_unique_value_only() {
        let a = person(1, "Alice", "France", 31);
        let mut b = person(1, "Alicia", "Spain", 32);
        assert!(a.same_entity(&b));
        assert_ne!(a, b);

        b.id = 2;
        assert!(!a.same_entity(&b));
    }

    #[test]
    fn test_update_from_copies_fields_but_keeps_id() {
        let mut stored = person(1, "Alice", "France", 31);
        let mut fresh = person(1, "Alice", "France", 32);
        fresh.name = "Alice B.".to_string();

        stored.update_from(&fresh);
        assert_eq!(stored.age, 32);
        assert_eq!(stored.name, "Alice B.");
        assert_eq!(stored.unique_value(), 1);
    }

    #[test]
    fn test_default_field_is_none() {
        #[derive(Clone)]
        struct Bare(u8);
        impl Entity for Bare {
            type Id = u8;
            fn unique_value(&self) -> u8 {
                self.0
            }
            fn update_from(&mut self, _other: &Self) {}
        }

        assert_eq!(Bare(3).field("anything"), None);
    }
}
