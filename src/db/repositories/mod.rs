mod cache_snapshot;
mod history;
