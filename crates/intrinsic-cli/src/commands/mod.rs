pub mod blend;
pub mod dcf;
pub mod monte_carlo;
pub mod peers;
pub mod valuation;
