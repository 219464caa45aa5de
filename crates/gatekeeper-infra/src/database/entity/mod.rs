pub mod ip_block;
