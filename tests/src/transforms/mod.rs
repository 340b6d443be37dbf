mod flatten;
mod pipeline;
mod rename;
