//! Backing stores for the index containers.
//!
//! Every container is generic over plain `AsRef<[T]>` storage. [`Owned`]
//! picks `Vec`s (buildable, writable); [`Mapped`] picks slices borrowed from
//! a mapped byte region (read-only). Query code is written once against the
//! `AsRef` capability and works for both.

use std::marker::PhantomData;

use crate::reference::Chromosome;

pub trait Storage {
    type Words: AsRef<[u64]>;
    type Table: AsRef<[u32]>;
    type Chromosomes: AsRef<[Chromosome]>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Owned;

impl Storage for Owned {
    type Words = Vec<u64>;
    type Table = Vec<u32>;
    type Chromosomes = Vec<Chromosome>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Mapped<'a>(PhantomData<&'a [u8]>);

impl<'a> Storage for Mapped<'a> {
    type Words = &'a [u64];
    type Table = &'a [u32];
    type Chromosomes = &'a [Chromosome];
}
