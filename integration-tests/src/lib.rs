//! Stand-in analysis components shared by the end-to-end tests.

pub mod test_components;
