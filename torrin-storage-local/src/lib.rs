mod driver;

pub use driver::LocalDriver;
