mod expiry;

pub use expiry::ExpiryTask;
