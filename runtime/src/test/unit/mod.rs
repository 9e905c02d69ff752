mod cache;
mod kernel;
