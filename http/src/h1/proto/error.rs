use httparse::Error as HttparseError;

/// protocol level failure while decoding a request or encoding a response.
#[derive(Debug)]
pub enum ProtoError {
    HeaderName,
    HeaderValue,
    HeaderTooLarge,
    Status,
    HttpParse(httparse::Error),
    Http(http::Error),
}

impl From<HttparseError> for ProtoError {
    fn from(e: HttparseError) -> Self {
        match e {
            // Too many headers would be treated the same as header too large to handle.
            // This is caused by overflow of HttpServiceConfig's HEADER_LIMIT const generic.
            HttparseError::TooManyHeaders => Self::HeaderTooLarge,
            HttparseError::HeaderName => Self::HeaderName,
            HttparseError::HeaderValue => Self::HeaderValue,
            e => Self::HttpParse(e),
        }
    }
}

impl From<http::Error> for ProtoError {
    fn from(e: http::Error) -> Self {
        Self::Http(e)
    }
}

impl From<http::method::InvalidMethod> for ProtoError {
    fn from(e: http::method::InvalidMethod) -> Self {
        Self::Http(e.into())
    }
}

impl From<http::uri::InvalidUri> for ProtoError {
    fn from(e: http::uri::InvalidUri) -> Self {
        Self::Http(e.into())
    }
}
