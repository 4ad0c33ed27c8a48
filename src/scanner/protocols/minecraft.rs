use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{ParseResponseError, StatusError};

/// The protocol version we send in the handshake if nothing else is
/// configured. Servers answer status requests regardless of the version.
pub const DEFAULT_PROTOCOL_VERSION: i32 = 47;

/// Status responses are a single string, which the protocol caps at 32767
/// characters of up to 4 bytes each. Anything bigger is garbage.
const MAX_RESPONSE_LENGTH: i32 = 2 * 1024 * 1024;

/// https://github.com/kiwiyou/craftping/blob/master/src/lib.rs#L73
pub fn build_status_request(hostname: &str, port: u16, protocol_version: i32) -> Vec<u8> {
    // buffer for the 1st packet's data part
    let mut buffer = vec![
        // 0 for handshake packet
        0x00,
    ];

    write_varint(&mut buffer, protocol_version); // protocol version

    // Some server implementations require hostname and port to be properly set (Notchian does not)
    write_varint(&mut buffer, hostname.len() as i32); // length of hostname as VarInt
    buffer.extend_from_slice(hostname.as_bytes());
    buffer.extend_from_slice(&port.to_be_bytes()); // server port as unsigned short
    buffer.push(0x01); // next state: 1 (status) as VarInt

    // buffer for the 1st and 2nd packet
    let mut full_buffer = vec![];
    write_varint(&mut full_buffer, buffer.len() as i32); // length of 1st packet id + data as VarInt
    full_buffer.append(&mut buffer);
    full_buffer.extend_from_slice(&[
        1,    // length of 2nd packet id + data as VarInt
        0x00, // 2nd packet id: 0 for request as VarInt
    ]);

    full_buffer
}

pub fn write_varint(writer: &mut Vec<u8>, mut value: i32) {
    if value == 0 {
        writer.push(0);
    }
    while value != 0 {
        let mut byte = (value & 0b0111_1111) as u8;
        value = (value >> 7) & (i32::MAX >> 6);
        if value != 0 {
            byte |= 0b1000_0000;
        }
        writer.push(byte);
    }
}

pub async fn read_varint<R>(reader: &mut R) -> Result<i32, StatusError>
where
    R: AsyncRead + Unpin,
{
    let mut ans = 0;
    for i in 0..5 {
        let byte = reader.read_u8().await.map_err(incomplete)?;
        ans |= ((byte & 0b0111_1111) as i32) << (7 * i);
        if byte & 0b1000_0000 == 0 {
            return Ok(ans);
        }
    }
    Err(ParseResponseError::VarIntTooLong.into())
}

/// Send a status request and read back the JSON the server replies with.
pub async fn request_status<S>(
    stream: &mut S,
    hostname: &str,
    port: u16,
    protocol_version: i32,
) -> Result<String, StatusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&build_status_request(hostname, port, protocol_version))
        .await?;
    stream.flush().await?;

    read_status_response(stream).await
}

pub async fn read_status_response<R>(reader: &mut R) -> Result<String, StatusError>
where
    R: AsyncRead + Unpin,
{
    // only sanity checked, the json length is what we read by
    let packet_length = read_varint(reader).await?;
    if packet_length <= 0 {
        return Err(ParseResponseError::InvalidLength(packet_length).into());
    }
    let packet_id = read_varint(reader).await?;
    if packet_id != 0x00 {
        return Err(ParseResponseError::UnexpectedPacketId(packet_id).into());
    }
    let response_length = read_varint(reader).await?;
    if !(0..=MAX_RESPONSE_LENGTH).contains(&response_length) {
        return Err(ParseResponseError::InvalidLength(response_length).into());
    }

    let mut status_buffer = vec![0; response_length as usize];
    reader
        .read_exact(&mut status_buffer)
        .await
        .map_err(incomplete)?;

    let status_string = String::from_utf8_lossy(&status_buffer).into_owned();

    // make sure it starts with {
    if !status_string.starts_with('{') {
        return Err(ParseResponseError::NotJson.into());
    }

    Ok(status_string)
}

/// The server hanging up halfway through a response is its fault, not the
/// network's.
fn incomplete(err: io::Error) -> StatusError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ParseResponseError::Incomplete.into()
    } else {
        err.into()
    }
}
