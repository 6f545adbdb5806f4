pub mod meili;
pub mod phases;
pub mod pinecone;
pub mod tools;
pub mod websearch;
