mod common;
mod points;
mod week;
