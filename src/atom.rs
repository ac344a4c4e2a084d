use chrono::{DateTime, Utc};
use quick_xml::events::*;

use crate::{
    materializer::{
        NavigationContent, ProjectedEntity, ProjectedFeed, ProjectedNavigation, ProjectedProperty,
    },
    value::{EdmType, Value},
};

///////////////////////////////////////////////////////////////////////////////

pub const NS_ATOM: &str = "http://www.w3.org/2005/Atom";
pub const NS_DATA: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices";
pub const NS_METADATA: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/metadata";
pub const SCHEME: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/scheme";
pub const REL_RELATED: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/related/";

pub const LINK_TYPE_FEED: &str = "application/atom+xml;type=feed";
pub const LINK_TYPE_ENTRY: &str = "application/atom+xml;type=entry";

///////////////////////////////////////////////////////////////////////////////

/// Shared inputs of every element written for one response.
pub struct AtomWriter<'a, W: std::io::Write> {
    writer: &'a mut quick_xml::Writer<W>,
    service_base_url: &'a str,
    updated: String,
}

impl<'a, W: std::io::Write> AtomWriter<'a, W> {
    pub fn new(
        writer: &'a mut quick_xml::Writer<W>,
        service_base_url: &'a str,
        updated_time: DateTime<Utc>,
    ) -> Self {
        Self {
            writer,
            service_base_url,
            updated: encode_date_time(&updated_time),
        }
    }

    fn write_decl(&mut self) -> quick_xml::Result<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        Ok(())
    }

    fn root(&self, tag: &'static str) -> BytesStart<'static> {
        let mut start = BytesStart::new(tag);
        start.push_attribute(("xml:base", self.service_base_url));
        start.push_attribute(("xmlns", NS_ATOM));
        start.push_attribute(("xmlns:d", NS_DATA));
        start.push_attribute(("xmlns:m", NS_METADATA));
        start
    }

    // <?xml version="1.0" encoding="utf-8"?>
    // <feed xml:base="http://example.com/odata/" xmlns=... xmlns:d=... xmlns:m=...>
    //   <id>http://example.com/odata/Customers</id>
    //   <title type="text">Customers</title>
    //   <updated>2023-01-01T00:00:00.000Z</updated>
    //   <link rel="self" title="Customers" href="Customers"/>
    //   <m:count>3</m:count>
    //   <entry>...</entry>
    //   <link rel="next" href="http://example.com/odata/Customers?$skiptoken=2"/>
    // </feed>
    pub fn write_feed_document(&mut self, feed: &ProjectedFeed) -> quick_xml::Result<()> {
        self.write_decl()?;
        let root = self.root("feed");
        self.write_feed(feed, root)
    }

    pub fn write_entry_document(&mut self, entry: &ProjectedEntity) -> quick_xml::Result<()> {
        self.write_decl()?;
        let root = self.root("entry");
        self.write_entry(entry, root)
    }

    /// Single property response: `<d:Name xmlns:d=... m:type=...>value</d:Name>`
    pub fn write_property_document(
        &mut self,
        name: &str,
        typ: Option<&EdmType>,
        value: &Value,
    ) -> quick_xml::Result<()> {
        self.write_decl()?;
        let tag = format!("d:{name}");
        let mut start = BytesStart::new(tag.as_str());
        start.push_attribute(("xmlns:d", NS_DATA));
        start.push_attribute(("xmlns:m", NS_METADATA));
        self.write_value(start, typ, value)
    }

    fn write_feed(&mut self, feed: &ProjectedFeed, start: BytesStart<'_>) -> quick_xml::Result<()> {
        let title = feed.href.rsplit('/').next().unwrap_or(&feed.entity_set);

        self.writer.write_event(Event::Start(start))?;
        self.writer
            .create_element("id")
            .write_text_content(BytesText::new(&format!("{}{}", self.service_base_url, feed.href)))?;
        self.writer
            .create_element("title")
            .with_attribute(("type", "text"))
            .write_text_content(BytesText::new(title))?;
        self.writer
            .create_element("updated")
            .write_text_content(BytesText::new(&self.updated))?;
        self.writer
            .create_element("link")
            .with_attributes([("rel", "self"), ("title", title), ("href", feed.href.as_str())])
            .write_empty()?;

        if let Some(count) = feed.count {
            self.writer
                .create_element("m:count")
                .write_text_content(BytesText::new(&count.to_string()))?;
        }

        for entry in &feed.entries {
            self.write_entry(entry, BytesStart::new("entry"))?;
        }

        if let Some(next) = &feed.next_link {
            self.writer
                .create_element("link")
                .with_attributes([("rel", "next"), ("href", next.as_str())])
                .write_empty()?;
        }

        self.writer.write_event(Event::End(BytesEnd::new("feed")))?;
        Ok(())
    }

    fn write_entry(
        &mut self,
        entry: &ProjectedEntity,
        start: BytesStart<'_>,
    ) -> quick_xml::Result<()> {
        let href = entry.href();

        self.writer.write_event(Event::Start(start))?;
        self.writer
            .create_element("id")
            .write_text_content(BytesText::new(&format!("{}{href}", self.service_base_url)))?;
        self.writer
            .create_element("category")
            .with_attributes([("scheme", SCHEME), ("term", entry.type_name.as_str())])
            .write_empty()?;
        self.writer
            .create_element("link")
            .with_attributes([
                ("rel", "edit"),
                ("title", entry.entity_set.as_str()),
                ("href", href.as_str()),
            ])
            .write_empty()?;

        for nav in &entry.navigations {
            self.write_navigation(&href, nav)?;
        }

        self.writer.create_element("title").write_empty()?;
        self.writer
            .create_element("updated")
            .write_text_content(BytesText::new(&self.updated))?;
        self.writer
            .write_event(Event::Start(BytesStart::new("author")))?;
        self.writer.create_element("name").write_empty()?;
        self.writer.write_event(Event::End(BytesEnd::new("author")))?;

        if entry.properties.is_empty() {
            self.writer
                .create_element("content")
                .with_attribute(("type", "application/xml"))
                .write_empty()?;
        } else {
            self.writer.write_event(Event::Start(
                BytesStart::new("content").with_attributes([("type", "application/xml")]),
            ))?;
            self.writer
                .write_event(Event::Start(BytesStart::new("m:properties")))?;
            for prop in &entry.properties {
                self.write_property(prop)?;
            }
            self.writer
                .write_event(Event::End(BytesEnd::new("m:properties")))?;
            self.writer.write_event(Event::End(BytesEnd::new("content")))?;
        }

        self.writer.write_event(Event::End(BytesEnd::new("entry")))?;
        Ok(())
    }

    // <link rel=".../related/Orders" type="application/atom+xml;type=feed" title="Orders" href="Customers(1)/Orders">
    //   <m:inline>
    //     <feed>...</feed>
    //   </m:inline>
    // </link>
    fn write_navigation(
        &mut self,
        entry_href: &str,
        nav: &ProjectedNavigation,
    ) -> quick_xml::Result<()> {
        let rel = format!("{REL_RELATED}{}", nav.name);
        let href = format!("{entry_href}/{}", nav.name);
        let typ = if nav.is_collection {
            LINK_TYPE_FEED
        } else {
            LINK_TYPE_ENTRY
        };

        let link = BytesStart::new("link").with_attributes([
            ("rel", rel.as_str()),
            ("type", typ),
            ("title", nav.name.as_str()),
            ("href", href.as_str()),
        ]);

        match &nav.content {
            NavigationContent::Deferred => {
                self.writer.write_event(Event::Empty(link))?;
            }
            NavigationContent::Entry(None) => {
                self.writer.write_event(Event::Start(link))?;
                self.writer.create_element("m:inline").write_empty()?;
                self.writer.write_event(Event::End(BytesEnd::new("link")))?;
            }
            NavigationContent::Entry(Some(entry)) => {
                self.writer.write_event(Event::Start(link))?;
                self.writer
                    .write_event(Event::Start(BytesStart::new("m:inline")))?;
                self.write_entry(entry, BytesStart::new("entry"))?;
                self.writer
                    .write_event(Event::End(BytesEnd::new("m:inline")))?;
                self.writer.write_event(Event::End(BytesEnd::new("link")))?;
            }
            NavigationContent::Feed(feed) => {
                self.writer.write_event(Event::Start(link))?;
                self.writer
                    .write_event(Event::Start(BytesStart::new("m:inline")))?;
                self.write_feed(feed, BytesStart::new("feed"))?;
                self.writer
                    .write_event(Event::End(BytesEnd::new("m:inline")))?;
                self.writer.write_event(Event::End(BytesEnd::new("link")))?;
            }
        }
        Ok(())
    }

    fn write_property(&mut self, prop: &ProjectedProperty) -> quick_xml::Result<()> {
        let tag = format!("d:{}", prop.name);
        self.write_value(BytesStart::new(tag.as_str()), prop.typ.as_ref(), &prop.value)
    }

    // <d:Name m:type="Edm.String">Alice</d:Name>
    // <d:Phone m:type="Edm.String" m:null="true"/>
    fn write_value(
        &mut self,
        mut start: BytesStart<'_>,
        typ: Option<&EdmType>,
        value: &Value,
    ) -> quick_xml::Result<()> {
        let type_name = typ.map(EdmType::edm_name);
        if let Some(type_name) = &type_name {
            start.push_attribute(("m:type", type_name.as_str()));
        }
        let end = start.to_end().into_owned();

        match value {
            Value::Null => {
                start.push_attribute(("m:null", "true"));
                self.writer.write_event(Event::Empty(start))?;
            }
            Value::Complex(complex) => {
                self.writer.write_event(Event::Start(start))?;
                for (name, member) in &complex.properties {
                    let tag = format!("d:{name}");
                    let member_type = member.edm_type();
                    self.write_value(BytesStart::new(tag.as_str()), member_type.as_ref(), member)?;
                }
                self.writer.write_event(Event::End(end))?;
            }
            Value::Collection(items) => {
                self.writer.write_event(Event::Start(start))?;
                let item_type = match typ {
                    Some(EdmType::Collection(inner)) => Some(inner.as_ref().clone()),
                    _ => None,
                };
                for item in items {
                    let item_type = item_type.clone().or_else(|| item.edm_type());
                    self.write_value(BytesStart::new("d:element"), item_type.as_ref(), item)?;
                }
                self.writer.write_event(Event::End(end))?;
            }
            _ => {
                self.writer.write_event(Event::Start(start))?;
                self.writer
                    .write_event(Event::Text(BytesText::new(&value.to_text())))?;
                self.writer.write_event(Event::End(end))?;
            }
        }
        Ok(())
    }
}

fn encode_date_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
