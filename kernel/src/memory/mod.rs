//! Memory concerns this kernel still needs with paging out of scope (spec
//! §1 Non-goals): a global heap and kernel-task stacks, both carved out of
//! physical memory reached through the HHDM offset instead of a page
//! table this kernel never builds.

pub mod heap;
pub mod stack;
