use crate::core::symbols::{decode, encode};

pub fn encode_main(text: &str) -> anyhow::Result<i32> {
    println!("{}", encode(text));
    Ok(0)
}

pub fn decode_main(cells: &str) -> anyhow::Result<i32> {
    println!("{}", decode(cells.trim()));
    Ok(0)
}
