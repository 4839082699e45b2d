use anyhow::Context;
use std::io::BufRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
        }
    }

    /// Render the `"<type> <size>\0"` prefix of a stored object
    pub fn header(&self, size: usize) -> String {
        format!("{} {}\0", self.as_str(), size)
    }

    /// Consume the `"<type> <size>\0"` prefix and return both parts
    pub fn parse_header(data_reader: &mut impl BufRead) -> anyhow::Result<(ObjectType, usize)> {
        let mut object_type = Vec::new();
        data_reader.read_until(b' ', &mut object_type)?;
        if object_type.pop() != Some(b' ') {
            anyhow::bail!("unexpected EOF in object header");
        }

        let object_type = std::str::from_utf8(&object_type)?;
        let object_type = ObjectType::try_from(object_type)?;

        let mut size = Vec::new();
        data_reader.read_until(b'\0', &mut size)?;
        if size.pop() != Some(b'\0') {
            anyhow::bail!("unexpected EOF in object size");
        }

        let size = std::str::from_utf8(&size)?
            .parse::<usize>()
            .context("Invalid object size")?;

        Ok((object_type, size))
    }
}

impl TryFrom<&str> for ObjectType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            _ => Err(anyhow::anyhow!("Invalid object type {value}")),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
