pub mod store;
pub use store::{SeqStore, StoreError};

pub mod compare;
pub use compare::Comparer;

pub mod mixture;
pub use mixture::{MixtureStat, MixtureTest};

pub mod matrix;
pub use matrix::{MatrixError, Neighbour, NeighbourFormat, SparseMatrix};

pub mod msa;
pub use msa::{Msa, MsaBuilder, MsaRow};
