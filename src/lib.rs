pub mod bus;
pub mod cpu_m68k;
pub mod loader;
pub mod util;

#[cfg(test)]
pub mod test;
