use std::io::Read;

use crate::web::{Result, WebError};

pub trait FormDataDecodable<T> {
    fn from_formdata(fields: Vec<(String, String)>) -> Result<T>;
}

fn decode_component(value: &str) -> Result<String> {
    let value = value.replace('+', " ");
    urlencoding::decode(&value)
        .map(|x| x.into_owned())
        .map_err(|_| WebError::InvalidRequest(format!("Malformed form value: {}", value)))
}

/// Decode an `application/x-www-form-urlencoded` string into ordered pairs
pub fn decode_pairs(data: &str) -> Result<Vec<(String, String)>> {
    data.split('&')
        .filter(|x| !x.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = decode_component(parts.next().unwrap_or_default())?;
            let value = decode_component(parts.next().unwrap_or_default())?;
            Ok((key, value))
        })
        .collect()
}

pub fn parse_formdata<R: Read>(data: &mut R) -> Result<Vec<(String, String)>> {
    let mut data_str = String::new();
    data.read_to_string(&mut data_str)?;
    decode_pairs(data_str.trim())
}

/// Split a request URL into its path and decoded query pairs
pub fn split_url(url: &str) -> Result<(&str, Vec<(String, String)>)> {
    match url.find('?') {
        Some(pos) => Ok((&url[..pos], decode_pairs(&url[pos + 1..])?)),
        None => Ok((url, Vec::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formdata() {
        let mut body = "name=pc1&ip=192.168.0.10".as_bytes();
        assert_eq!(
            parse_formdata(&mut body).unwrap(),
            vec![
                ("name".to_string(), "pc1".to_string()),
                ("ip".to_string(), "192.168.0.10".to_string()),
            ]
        );
    }

    #[test]
    fn test_decoding() {
        let pairs = decode_pairs("hostname=pc1.home.local&note=a+b%20c&flag").unwrap();
        assert_eq!(pairs[0].1, "pc1.home.local");
        assert_eq!(pairs[1].1, "a b c");
        assert_eq!(pairs[2], ("flag".to_string(), String::new()));

        assert!(decode_pairs("name=%FF%FE").is_err());
    }

    #[test]
    fn test_split_url() {
        let (path, query) = split_url("/?warning=reload").unwrap();
        assert_eq!(path, "/");
        assert_eq!(query, vec![("warning".to_string(), "reload".to_string())]);

        assert_eq!(split_url("/add").unwrap(), ("/add", Vec::new()));
    }
}
