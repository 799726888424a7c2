//! Core types for the message broker: payload type identities and the
//! borrowed payload view handed to handlers.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A payload as seen by the broker: any thread-safe value.
pub type DynPayload = dyn Any + Send + Sync;

/// Converts a borrowed payload into a borrowed view of one of its supertypes.
type Upcast = Arc<dyn Fn(&DynPayload) -> Option<&DynPayload> + Send + Sync>;

fn upcaster<F>(f: F) -> Upcast
where
    F: Fn(&DynPayload) -> Option<&DynPayload> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Root of the type hierarchy. A filter on this type accepts every payload.
enum Dynamic {}

/// A declared supertype of a [`MessageType`].
#[derive(Clone)]
struct Ancestor {
    id: TypeId,
    name: &'static str,
    upcast: Upcast,
}

/// Runtime identity of a payload type.
///
/// Carries the supertypes the type was declared to extend, so a filter can
/// answer "is the published type this type or a subtype of it" without
/// reflection at publish time.
#[derive(Clone)]
pub struct MessageType {
    id: TypeId,
    name: &'static str,
    ancestors: Arc<[Ancestor]>,
}

impl MessageType {
    /// Identity of `T` with no declared supertypes.
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            ancestors: Arc::from(Vec::new()),
        }
    }

    /// The root type. As a filter it accepts any published payload, but never
    /// a publish that carries no payload.
    pub fn dynamic() -> Self {
        Self {
            id: TypeId::of::<Dynamic>(),
            name: "dynamic",
            ancestors: Arc::from(Vec::new()),
        }
    }

    /// Start declaring a type that extends one or more parent types.
    pub fn derived<T: Any + Send + Sync>() -> Derived<T> {
        Derived {
            name: type_name::<T>(),
            ancestors: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_dynamic(&self) -> bool {
        self.id == TypeId::of::<Dynamic>()
    }

    /// Whether `self`, used as a filter, accepts a payload of type `published`:
    /// the same type, a declared subtype, or anything when `self` is dynamic.
    pub fn accepts(&self, published: &MessageType) -> bool {
        self.is_dynamic() || self.id == published.id || published.extends(self.id)
    }

    /// Whether this type declares `id` among its supertypes.
    pub fn extends(&self, id: TypeId) -> bool {
        self.ancestors.iter().any(|a| a.id == id)
    }

    /// Names of the declared supertypes, nearest first.
    pub fn ancestor_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ancestors.iter().map(|a| a.name)
    }

    fn upcast<'a>(&self, value: &'a DynPayload, target: TypeId) -> Option<&'a DynPayload> {
        self.ancestors
            .iter()
            .find(|a| a.id == target)
            .and_then(|a| (a.upcast)(value))
    }
}

/// Type identity is the `TypeId`; declared ancestry does not take part.
impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageType {}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageType({})", self.name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Builder for a [`MessageType`] with declared supertypes.
///
/// ```ignore
/// let animal = MessageType::of::<Animal>();
/// let dog = MessageType::derived::<Dog>()
///     .extends(&animal, |dog: &Dog| &dog.animal)
///     .build();
/// assert!(animal.accepts(&dog));
/// ```
pub struct Derived<T> {
    name: &'static str,
    ancestors: Vec<Ancestor>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Any + Send + Sync> Derived<T> {
    /// Declare `parent` as a supertype, reachable through `upcast`.
    ///
    /// The parent's own supertypes are inherited, so ancestry is transitive.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not the identity of `P`.
    pub fn extends<P: Any + Send + Sync>(
        mut self,
        parent: &MessageType,
        upcast: fn(&T) -> &P,
    ) -> Self {
        assert_eq!(
            parent.id,
            TypeId::of::<P>(),
            "parent type {} does not match upcast target {}",
            parent.name,
            type_name::<P>()
        );

        let to_parent = upcaster(move |value| {
            value
                .downcast_ref::<T>()
                .map(|child| upcast(child) as &DynPayload)
        });

        for inherited in parent.ancestors.iter() {
            if self.ancestors.iter().any(|a| a.id == inherited.id) {
                continue;
            }
            let first = Arc::clone(&to_parent);
            let then = Arc::clone(&inherited.upcast);
            self.ancestors.push(Ancestor {
                id: inherited.id,
                name: inherited.name,
                upcast: upcaster(move |value| first(value).and_then(|p| then(p))),
            });
        }

        // Direct parents are searched before inherited ones.
        self.ancestors.retain(|a| a.id != parent.id);
        self.ancestors.insert(
            0,
            Ancestor {
                id: parent.id,
                name: parent.name,
                upcast: to_parent,
            },
        );
        self
    }

    pub fn build(self) -> MessageType {
        MessageType {
            id: TypeId::of::<T>(),
            name: self.name,
            ancestors: Arc::from(self.ancestors),
        }
    }
}

/// Borrowed view of a published payload together with its type identity.
#[derive(Clone, Copy)]
pub struct Payload<'a> {
    value: &'a DynPayload,
    message_type: &'a MessageType,
}

impl<'a> Payload<'a> {
    /// Pair a value with the type it is published as.
    pub fn new(value: &'a DynPayload, message_type: &'a MessageType) -> Self {
        Self {
            value,
            message_type,
        }
    }

    pub fn message_type(&self) -> &'a MessageType {
        self.message_type
    }

    pub fn as_any(&self) -> &'a DynPayload {
        self.value
    }

    /// View the payload as `T`, either directly or through a declared supertype.
    pub fn downcast_ref<T: Any>(&self) -> Option<&'a T> {
        if let Some(value) = self.value.downcast_ref::<T>() {
            return Some(value);
        }
        self.message_type
            .upcast(self.value, TypeId::of::<T>())
            .and_then(|parent| parent.downcast_ref::<T>())
    }

    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}

impl fmt::Debug for Payload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type", &self.message_type.name)
            .finish_non_exhaustive()
    }
}
