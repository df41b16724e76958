use core::num::NonZeroUsize;

use crate::Router;

/// A value that can be reduced to a `u64` for routing.
///
/// The reduction must be a pure function of the value: equal keys must map
/// to equal integers on every call, in every process. Signed integers are
/// reinterpreted as two's complement. Strings use 64-bit FNV-1a.
pub trait RoutingKey {
    fn routing_key(&self) -> u64;
}

macro_rules! impl_routing_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RoutingKey for $ty {
                #[inline]
                fn routing_key(&self) -> u64 {
                    *self as u64
                }
            }
        )*
    };
}

impl_routing_key!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl RoutingKey for u128 {
    #[inline]
    fn routing_key(&self) -> u64 {
        (*self ^ (*self >> 64)) as u64
    }
}

impl RoutingKey for i128 {
    #[inline]
    fn routing_key(&self) -> u64 {
        (*self as u128).routing_key()
    }
}

impl RoutingKey for str {
    fn routing_key(&self) -> u64 {
        fnv1a(self.as_bytes())
    }
}

impl RoutingKey for String {
    fn routing_key(&self) -> u64 {
        self.as_str().routing_key()
    }
}

impl RoutingKey for [u8] {
    fn routing_key(&self) -> u64 {
        fnv1a(self)
    }
}

impl<K> RoutingKey for &K
where
    K: RoutingKey + ?Sized,
{
    #[inline]
    fn routing_key(&self) -> u64 {
        (**self).routing_key()
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes.iter().fold(OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

/// Deterministic routing: `key mod N`.
///
/// When `N` is a power of two the modulo is computed as `key & (N - 1)`.
/// The router checks this itself; a mask is never applied to any other
/// count.
///
/// ## Features
/// - ✅ Pure: the same key always maps to the same stripe
/// - ✅ Per-key FIFO, since every task for a key enters one queue
/// - ❌ Key-less routing
///
/// ```
/// use core::num::NonZeroUsize;
/// use stripepool::{KeyRouter, Router};
///
/// let router = KeyRouter::new(NonZeroUsize::new(4).unwrap());
/// assert_eq!(router.route(7), 3);
/// assert_eq!(router.route_unkeyed(), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyRouter {
    stripes: usize,
    mask: Option<u64>,
}

impl KeyRouter {
    pub fn new(stripes: NonZeroUsize) -> Self {
        let stripes = stripes.get();
        let mask = stripes.is_power_of_two().then(|| stripes as u64 - 1);
        Self { stripes, mask }
    }

    /// Whether routing uses the power-of-two mask.
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }
}

impl Router for KeyRouter {
    fn stripes(&self) -> usize {
        self.stripes
    }

    #[inline]
    fn route(&self, key: u64) -> usize {
        let index = match self.mask {
            Some(mask) => key & mask,
            None => key % self.stripes as u64,
        };
        // Bounded by `stripes`, which is a usize.
        index as usize
    }

    fn route_unkeyed(&self) -> Option<usize> {
        None
    }
}
