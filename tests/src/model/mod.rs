mod archive;
mod hierarchy;
