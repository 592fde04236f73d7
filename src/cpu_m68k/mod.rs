pub mod alu;
pub mod asm;
pub mod condition;
pub mod cpu;
pub mod dispatch;
pub mod ea;
pub mod instruction;
pub mod instruction_table;
pub mod regs;
pub mod trap;
pub mod value;
