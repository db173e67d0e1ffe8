//! Small async helpers shared across the crate.

use std::pin::Pin;

use futures::Stream;

/// A type alias for a boxed stream. This keeps signatures readable when a
/// function returns a stream built from several combinators.
pub type BoxedStream<Item> = Pin<Box<dyn Stream<Item = Item> + Send>>;
