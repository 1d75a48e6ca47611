//! Low-level backend of the Vela compiler: assembly items, the peephole
//! optimiser, constant-materialisation strategy selection and final byte
//! emission with symbolic labels and linker fix-ups.

pub mod assembly;
pub mod constants;
pub mod item;
pub mod opcode;
pub mod peephole;

pub use assembly::{AsmError, Assembly, LinkRef, LinkedBytecode};
pub use constants::{optimize_constants, CostParams};
pub use item::{DataId, Item, ItemKind, LabelId, SubId, ADDRESS_WIDTH, LABEL_WIDTH};
pub use opcode::{Opcode, COPY_HORIZON};
pub use peephole::Peephole;
