use itertools::Itertools;

pub mod append_vec;
pub mod base64;
pub mod codec;
pub mod codec_vec;
pub(crate) mod metered;
pub mod signature;
pub mod u24;

pub(crate) fn hex_with_colons(data: &[u8]) -> String {
    hex::encode_upper(data)
        .chars()
        .chunks(2)
        .into_iter()
        .map(|mut chunk| format!("{}{}", chunk.next().unwrap(), chunk.next().unwrap()))
        .join(":")
}
