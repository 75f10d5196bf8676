/// Macro to implement the `From` pair for raw-value newtypes: amounts
/// ([`Share`](crate::protocol::Share)) and the typed object-id wrappers,
/// which all carry a single primitive and convert losslessly both ways.
#[macro_export]
macro_rules! impl_from_primitive {
    ($wrapper:ident, $primitive:ty) => {
        impl From<$primitive> for $wrapper {
            fn from(value: $primitive) -> Self {
                Self(value)
            }
        }

        impl From<$wrapper> for $primitive {
            fn from(wrapper: $wrapper) -> Self {
                wrapper.0
            }
        }
    };
}

/// Macro to declare a typed object id newtype over a raw instance number,
/// bound to one entry of [`ObjectTag`](crate::protocol::ObjectTag).
///
/// The generated type converts infallibly into [`ObjectId`] and checked back
/// out of it (the tag must match).
#[macro_export]
macro_rules! define_object_id {
    ($(#[$meta:meta])* $name:ident, $tag:expr) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Default,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(pub u64);

        $crate::impl_from_primitive!($name, u64);

        impl $name {
            pub const TAG: $crate::protocol::ObjectTag = $tag;

            pub fn object_id(self) -> $crate::protocol::ObjectId {
                $crate::protocol::ObjectId::new(Self::TAG, self.0)
            }
        }

        impl From<$name> for $crate::protocol::ObjectId {
            fn from(id: $name) -> Self {
                id.object_id()
            }
        }

        impl TryFrom<$crate::protocol::ObjectId> for $name {
            type Error = $crate::error::MeridianError;

            fn try_from(id: $crate::protocol::ObjectId) -> Result<Self, Self::Error> {
                if id.tag() == $tag {
                    Ok(Self(id.instance()))
                } else {
                    Err($crate::error::StateError::UnknownObject(id).into())
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.object_id().fmt(f)
            }
        }
    };
}
