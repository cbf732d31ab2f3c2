pub mod foreign_toplevel;
