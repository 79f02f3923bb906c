pub mod character;
pub mod dice;
pub mod object;
