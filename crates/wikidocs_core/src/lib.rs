pub mod config;
pub mod dokuwiki;
pub mod error;
pub mod gdocs;
pub mod idmap;
pub mod markup;
pub mod media;
pub mod normalize;
pub mod pipeline;
pub mod resolve;
pub mod rewriter;
pub mod runtime;
pub mod staging;
pub mod styler;
