use tracing::error;

use crate::{
    build_client,
    listing::DirArena,
    parser::{HtmlParser, ParseContext},
    remote::RemoteRegistry,
    session::Session,
    utils, ListArgs,
};

/// Parse a single page and print what the dispatcher makes of it.
pub fn list(args: ListArgs) -> ! {
    let client = build_client!(reqwest::blocking::Client, args);
    let session = Session::new(1);
    let parser = HtmlParser::new(RemoteRegistry::default());

    let html = match utils::again(
        || Ok(utils::get(&client, args.upstream.clone())?.text()?),
        args.retry,
    ) {
        Ok(html) => html,
        Err(e) => {
            error!("Failed to fetch {}: {:?}", args.upstream, e);
            std::process::exit(1);
        }
    };

    let mut arena = DirArena::new();
    let dir = arena.alloc(args.upstream.clone(), None);
    let ctx = ParseContext {
        client: Some(&client),
        session: &session,
        check_parents: !args.no_parent_check,
    };
    if let Err(e) = parser.parse_html(&mut arena, dir, &html, &ctx) {
        error!("Parse interrupted: {:?}", e);
        std::process::exit(1);
    }

    let node = arena.get(dir);
    match node.dialect {
        Some(dialect) => println!("Dialect: {}", dialect),
        None => println!("Dialect: (none matched)"),
    }
    if node.error {
        println!("Parse error, no entries");
        std::process::exit(1);
    }
    for sub in &node.subdirs {
        let sub = arena.get(*sub);
        println!("{}/ {}", sub.name, sub.url);
    }
    for file in &node.files {
        println!("{}", file);
    }
    std::process::exit(0);
}
