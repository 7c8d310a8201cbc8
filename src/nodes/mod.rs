//! Built-in extractors and the engine nodes the compiler wires around them.

mod byte_stream;
mod capture_sink;
mod concatenate;
mod data_writer;
#[cfg(test)]
mod data_writer_test;
mod decoder_source;
mod encoder_node;
mod tokenizer;
mod word_count;

pub use byte_stream::ByteStream;
pub use capture_sink::CaptureSink;
pub use concatenate::Concatenate;
pub use data_writer::DataWriter;
pub use decoder_source::DecoderSource;
pub use encoder_node::EncoderNode;
pub use tokenizer::Tokenizer;
pub use word_count::WordCount;
