mod backend;
mod common;
mod routing;
