// stc — Systolic Transform Core
//
// Library root. Lowers uniform recurrence equations to spatial pipeline IR:
// an affine space-time transform maps loop nests onto processing-element
// arrays, and the data-path synthesizers add the scatter chains, double
// buffers, and gather chains that feed and drain them.

pub mod bounds;
pub mod buffer;
pub mod check;
pub mod diag;
pub mod expr;
pub mod gather;
pub mod interp;
pub mod ir;
pub mod matrix;
pub mod names;
pub mod pass;
pub mod pipeline;
pub mod scatter;
pub mod schedule;
pub mod shift_reg;
pub mod space_time;
