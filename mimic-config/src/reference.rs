// Copyright ⓒ 2024-2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A value that is either written inline or referenced with `$ref`.

use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    sync::{Arc, OnceLock, Weak},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::SerializeMap};

pub(crate) type Slot<T> = Arc<OnceLock<Arc<T>>>;

/// Either an inline value, or a `$ref` to a value elsewhere.
///
/// A reference starts unresolved. Resolution binds it to a slot shared by
/// every reference to the same target, so that resolving the same target
/// twice yields the same [`Arc`]. A reference met again while its own target
/// is still being resolved becomes a back reference, holding only a [`Weak`]
/// to the slot, so that recursive schemas never form owning cycles.
pub enum Reference<T> {
    Inline(Arc<T>),
    Ref { reference: String, target: Target<T> },
}

pub enum Target<T> {
    Unresolved,
    Resolved(Slot<T>),
    Back(Weak<OnceLock<Arc<T>>>),
}

impl<T> Reference<T> {
    pub fn inline(value: T) -> Self {
        Self::Inline(Arc::new(value))
    }

    pub fn to(reference: impl Into<String>) -> Self {
        Self::Ref {
            reference: reference.into(),
            target: Target::Unresolved,
        }
    }

    /// The value, if inline or resolved.
    pub fn value(&self) -> Option<Arc<T>> {
        match self {
            Self::Inline(value) => Some(value.clone()),
            Self::Ref { target, .. } => target.value(),
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Inline(_) => None,
            Self::Ref { reference, .. } => Some(reference.as_str()),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Self::Ref {
                target: Target::Unresolved,
                ..
            }
        )
    }

    pub fn is_back_reference(&self) -> bool {
        matches!(
            self,
            Self::Ref {
                target: Target::Back(_),
                ..
            }
        )
    }

    pub(crate) fn slot(&self) -> Option<Slot<T>> {
        match self {
            Self::Ref {
                target: Target::Resolved(slot),
                ..
            } => Some(slot.clone()),
            _ => None,
        }
    }
}

impl<T> Target<T> {
    pub(crate) fn value(&self) -> Option<Arc<T>> {
        match self {
            Self::Unresolved => None,
            Self::Resolved(slot) => slot.get().cloned(),
            Self::Back(weak) => weak.upgrade().and_then(|slot| slot.get().cloned()),
        }
    }
}

/// Owns the slots of linked component references.
///
/// A recursive component refers back to itself through a [`Weak`], so its
/// slot needs an owner even when nothing else refers to the component.
#[derive(Clone, Default)]
pub struct Arena(Vec<Arc<dyn Any + Send + Sync>>);

impl Arena {
    pub(crate) fn keep<T: Send + Sync + 'static>(&mut self, slot: Slot<T>) {
        self.0.push(slot);
    }
}

impl Debug for Arena {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Arena").field(&self.0.len()).finish()
    }
}

// ownership only, never part of a description's value
impl PartialEq for Arena {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> From<T> for Reference<T> {
    fn from(value: T) -> Self {
        Self::inline(value)
    }
}

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Inline(value) => Self::Inline(value.clone()),
            Self::Ref { reference, target } => Self::Ref {
                reference: reference.clone(),
                target: target.clone(),
            },
        }
    }
}

impl<T> Clone for Target<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Unresolved => Self::Unresolved,
            Self::Resolved(slot) => Self::Resolved(slot.clone()),
            Self::Back(weak) => Self::Back(weak.clone()),
        }
    }
}

impl<T: Debug> Debug for Reference<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(value) => value.fmt(f),
            Self::Ref { reference, target } => match target {
                Target::Unresolved => f.debug_tuple("Unresolved").field(reference).finish(),
                Target::Resolved(slot) => f
                    .debug_struct("Resolved")
                    .field("reference", reference)
                    .field("value", &slot.get())
                    .finish(),
                Target::Back(_) => f.debug_tuple("Back").field(reference).finish(),
            },
        }
    }
}

// references compare by target name, which keeps recursive schemas finite
impl<T: PartialEq> PartialEq for Reference<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Inline(this), Self::Inline(other)) => this == other,
            (Self::Ref { reference: this, .. }, Self::Ref { reference: other, .. }) => {
                this == other
            }
            _ => false,
        }
    }
}

impl<T: Serialize> Serialize for Reference<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Inline(value) => value.serialize(serializer),
            Self::Ref { reference, .. } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$ref", reference)?;
                map.end()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Wire<T> {
    Ref {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Inline(T),
}

impl<'de, T> Deserialize<'de> for Reference<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Wire::deserialize(deserializer).map(|wire| match wire {
            Wire::Ref { reference } => Self::to(reference),
            Wire::Inline(value) => Self::inline(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    struct Named {
        name: String,
    }

    #[test]
    fn deserialize_ref_before_inline() -> Result<(), serde_json::Error> {
        let reference: Reference<Named> =
            serde_json::from_value(json!({"$ref": "#/components/schemas/Pet"}))?;
        assert_eq!(Some("#/components/schemas/Pet"), reference.reference());
        assert!(reference.is_unresolved());
        assert!(reference.value().is_none());

        let inline: Reference<Named> = serde_json::from_value(json!({"name": "abc"}))?;
        assert_eq!(None, inline.reference());
        assert_eq!(
            Some("abc".to_owned()),
            inline.value().map(|named| named.name.clone())
        );

        Ok(())
    }

    #[test]
    fn serialize_keeps_ref() -> Result<(), serde_json::Error> {
        let reference = Reference::<Named>::to("other.json#/a");
        assert_eq!(json!({"$ref": "other.json#/a"}), serde_json::to_value(&reference)?);
        Ok(())
    }

    #[test]
    fn back_reference_does_not_keep_target_alive() {
        let slot: Slot<Named> = Arc::new(OnceLock::new());
        _ = slot.set(Arc::new(Named { name: "a".into() }));

        let back = Reference::Ref {
            reference: "#/a".into(),
            target: Target::Back(Arc::downgrade(&slot)),
        };
        assert!(back.is_back_reference());
        assert!(back.value().is_some());

        drop(slot);
        assert!(back.value().is_none());
    }
}
