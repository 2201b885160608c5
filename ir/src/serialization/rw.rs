//! Thin wrappers over `rmp`'s primitive encode/decode, mapping their error
//! types onto the crate error enum and keeping the msgpack API surface in
//! one place.

use std::fmt::Debug;

use rmp::decode::{Bytes, RmpRead};

use crate::error::{Error, Result};

fn ser<E: Debug>(error: E) -> Error {
    Error::Serialize { message: format!("{error:?}") }
}

fn de<E: Debug>(error: E) -> Error {
    Error::Deserialize { message: format!("{error:?}") }
}

pub fn w_array(out: &mut Vec<u8>, len: u32) -> Result<()> {
    rmp::encode::write_array_len(out, len).map_err(ser)?;
    Ok(())
}

pub fn w_u8(out: &mut Vec<u8>, value: u8) -> Result<()> {
    rmp::encode::write_uint(out, value as u64).map_err(ser)?;
    Ok(())
}

pub fn w_u32(out: &mut Vec<u8>, value: u32) -> Result<()> {
    rmp::encode::write_uint(out, value as u64).map_err(ser)?;
    Ok(())
}

pub fn w_u64(out: &mut Vec<u8>, value: u64) -> Result<()> {
    rmp::encode::write_uint(out, value).map_err(ser)?;
    Ok(())
}

pub fn w_i64(out: &mut Vec<u8>, value: i64) -> Result<()> {
    rmp::encode::write_sint(out, value).map_err(ser)?;
    Ok(())
}

pub fn w_f64(out: &mut Vec<u8>, value: f64) -> Result<()> {
    rmp::encode::write_f64(out, value).map_err(ser)?;
    Ok(())
}

pub fn w_bool(out: &mut Vec<u8>, value: bool) -> Result<()> {
    rmp::encode::write_bool(out, value).map_err(ser)?;
    Ok(())
}

pub fn w_str(out: &mut Vec<u8>, value: &str) -> Result<()> {
    rmp::encode::write_str(out, value).map_err(ser)?;
    Ok(())
}

pub fn r_array(rd: &mut Bytes<'_>) -> Result<u32> {
    rmp::decode::read_array_len(rd).map_err(de)
}

pub fn r_u8(rd: &mut Bytes<'_>) -> Result<u8> {
    rmp::decode::read_int(rd).map_err(de)
}

pub fn r_u32(rd: &mut Bytes<'_>) -> Result<u32> {
    rmp::decode::read_int(rd).map_err(de)
}

pub fn r_u64(rd: &mut Bytes<'_>) -> Result<u64> {
    rmp::decode::read_int(rd).map_err(de)
}

pub fn r_i64(rd: &mut Bytes<'_>) -> Result<i64> {
    rmp::decode::read_int(rd).map_err(de)
}

pub fn r_f64(rd: &mut Bytes<'_>) -> Result<f64> {
    rmp::decode::read_f64(rd).map_err(de)
}

pub fn r_bool(rd: &mut Bytes<'_>) -> Result<bool> {
    rmp::decode::read_bool(rd).map_err(de)
}

pub fn r_str(rd: &mut Bytes<'_>) -> Result<String> {
    let len = rmp::decode::read_str_len(rd).map_err(de)? as usize;
    let mut buf = vec![0u8; len];
    rd.read_exact_buf(&mut buf).map_err(de)?;
    String::from_utf8(buf).map_err(de)
}
