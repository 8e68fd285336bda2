//! Macros for reducing message-set boilerplate.
//!
//! A host application usually has one enum covering every payload it
//! exchanges, a `From` impl per payload type, a [`WireMessage`] impl mapping
//! variants to wire type names, and a [`MessageRegistry`] registering the
//! same names for decoding. [`message_set!`] generates all four from one
//! declaration, keeping the send side and the receive side of the name
//! mapping in a single place.
//!
//! [`WireMessage`]: crate::WireMessage
//! [`MessageRegistry`]: crate::MessageRegistry

/// Define an application message enum wired for sending and receiving.
///
/// Each entry pairs a wire type name with a payload type; the payload type
/// doubles as the variant name. Payload types must implement
/// `serde::Serialize` and `serde::Deserialize` (plus `Debug`, `Clone`,
/// `PartialEq` to match the derives on the generated enum).
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use switchboard::{message_set, WireMessage};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// pub struct Ping {
///     pub n: u32,
/// }
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// pub struct Chat {
///     pub body: String,
/// }
///
/// message_set! {
///     /// Everything the demo application exchanges.
///     pub enum DemoMessage {
///         "Demo.Ping" => Ping,
///         "Demo.Chat" => Chat,
///     }
/// }
///
/// let message = DemoMessage::from(Ping { n: 1 });
/// assert_eq!(message.type_name(), "Demo.Ping");
///
/// let registry = DemoMessage::registry();
/// assert!(registry.contains("Demo.Chat"));
/// ```
///
/// The generated enum derives `Debug`, `Clone`, and `PartialEq`; `Clone` is
/// required by the messenger's subscriber fan-out.
#[macro_export]
macro_rules! message_set {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $wire:literal => $payload:ident ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $name {
            $(
                #[doc = concat!("Payload carried under the wire name `", $wire, "`.")]
                $payload($payload),
            )+
        }

        $(
            impl ::std::convert::From<$payload> for $name {
                fn from(value: $payload) -> Self {
                    Self::$payload(value)
                }
            }
        )+

        impl $crate::WireMessage for $name {
            fn type_name(&self) -> &str {
                match self {
                    $( Self::$payload(_) => $wire, )+
                }
            }

            fn to_payload(&self) -> ::serde_json::Result<::std::vec::Vec<u8>> {
                match self {
                    $( Self::$payload(inner) => ::serde_json::to_vec(inner), )+
                }
            }
        }

        impl $name {
            /// Build a registry covering every payload type in this set.
            $vis fn registry() -> $crate::MessageRegistry<$name> {
                let mut registry = $crate::MessageRegistry::new();
                $( registry.register::<$payload>($wire); )+
                registry
            }
        }
    };
}
