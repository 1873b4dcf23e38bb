pub mod ids;
pub mod lifecycle;
pub mod trip;
pub mod wallet;
