mod blocking;
mod combinators;
mod config;
mod rejections;
mod settlement;
mod timers;
