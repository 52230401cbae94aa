mod greedy;
mod rand_distrib;
mod temperature;
mod top_k;
mod top_p;

pub use self::{greedy::*, rand_distrib::*, temperature::*, top_k::*, top_p::*};
