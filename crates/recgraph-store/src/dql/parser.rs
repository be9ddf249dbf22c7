//! DQL parser for the subset the record layer emits

use recgraph_core::{RecgraphError, Result};

use super::lexer::{tokenize, Token};

// ============================================================================
// AST
// ============================================================================

/// A query: one or more named blocks
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub blocks: Vec<Block>,
}

/// `name(func: <root>, first: n, ...) @filter(...) { selections }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub root: Func,
    pub first: Option<usize>,
    pub offset: Option<usize>,
    pub order: Vec<Order>,
    pub filter: Option<FilterExpr>,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub attr: String,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Func(Func),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
}

/// `name(arg, ...)`
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub name: String,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Word(String),
    Str(String),
    Regex { pattern: String, flags: String },
    List(Vec<Arg>),
}

impl Arg {
    /// Textual content of a word or string argument
    pub fn text(&self) -> Option<&str> {
        match self {
            Arg::Word(w) | Arg::Str(w) => Some(w),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// `uid` or `alias: uid`
    Uid { alias: String },
    /// `expand(_all_)` with an optional child block for uid edges
    ExpandAll { children: Option<Vec<Selection>> },
    /// A predicate, forward or `~reverse`
    Predicate {
        alias: Option<String>,
        name: String,
        reverse: bool,
        filter: Option<FilterExpr>,
        children: Option<Vec<Selection>>,
    },
}

// ============================================================================
// Parser
// ============================================================================

/// Parse a query string
pub fn parse(input: &str) -> Result<Query> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.query()
}

fn syntax(msg: impl std::fmt::Display) -> RecgraphError {
    RecgraphError::engine(format!("while parsing query: {msg}"))
}

/// Strip `<...>` around IRI-style predicate names
fn bare(name: &str) -> String {
    name.strip_prefix('<')
        .and_then(|n| n.strip_suffix('>'))
        .unwrap_or(name)
        .to_string()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(syntax(format!("expected {expected:?}, found {t:?}"))),
            None => Err(syntax(format!("expected {expected:?}, found end of input"))),
        }
    }

    fn word(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            Some(t) => Err(syntax(format!("expected a name, found {t:?}"))),
            None => Err(syntax("expected a name, found end of input")),
        }
    }

    fn is_word(&self, text: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(text))
    }

    fn query(&mut self) -> Result<Query> {
        self.expect(Token::LBrace)?;
        let mut blocks = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            if self.peek().is_none() {
                return Err(syntax("unclosed query"));
            }
            blocks.push(self.block()?);
        }
        self.expect(Token::RBrace)?;
        if let Some(t) = self.peek() {
            return Err(syntax(format!("unexpected {t:?} after query")));
        }
        if blocks.is_empty() {
            return Err(syntax("query has no blocks"));
        }
        Ok(Query { blocks })
    }

    fn block(&mut self) -> Result<Block> {
        let name = self.word()?;
        self.expect(Token::LParen)?;

        let mut root = None;
        let mut first = None;
        let mut offset = None;
        let mut order = Vec::new();

        loop {
            let key = self.word()?;
            self.expect(Token::Colon)?;
            match key.as_str() {
                "func" => root = Some(self.func()?),
                "first" => first = Some(self.number()?),
                "offset" => offset = Some(self.number()?),
                "orderasc" => order.push(Order {
                    attr: bare(&self.word()?),
                    desc: false,
                }),
                "orderdesc" => order.push(Order {
                    attr: bare(&self.word()?),
                    desc: true,
                }),
                other => return Err(syntax(format!("unsupported block argument {other}"))),
            }
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                t => return Err(syntax(format!("expected , or ) in block arguments, found {t:?}"))),
            }
        }

        let root = root.ok_or_else(|| syntax(format!("block {name} has no root function")))?;
        let filter = self.directives()?;
        let selections = self.children()?;

        Ok(Block {
            name,
            root,
            first,
            offset,
            order,
            filter,
            selections,
        })
    }

    fn number(&mut self) -> Result<usize> {
        let word = self.word()?;
        word.parse()
            .map_err(|_| syntax(format!("expected a non-negative integer, found {word}")))
    }

    /// Zero or one `@filter(...)`
    fn directives(&mut self) -> Result<Option<FilterExpr>> {
        let mut filter = None;
        while self.peek() == Some(&Token::At) {
            self.next();
            let name = self.word()?;
            if name != "filter" {
                return Err(syntax(format!("unsupported directive @{name}")));
            }
            self.expect(Token::LParen)?;
            filter = Some(self.or_expr()?);
            self.expect(Token::RParen)?;
        }
        Ok(filter)
    }

    fn children(&mut self) -> Result<Vec<Selection>> {
        self.expect(Token::LBrace)?;
        let mut selections = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.next();
                    return Ok(selections);
                }
                None => return Err(syntax("unclosed selection block")),
                _ => selections.push(self.selection()?),
            }
        }
    }

    fn selection(&mut self) -> Result<Selection> {
        let alias = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Word(w)), Some(Token::Colon)) => {
                let alias = w.clone();
                self.pos += 2;
                Some(alias)
            }
            _ => None,
        };

        let name = self.word()?;

        if name == "uid" {
            return Ok(Selection::Uid {
                alias: alias.unwrap_or(name),
            });
        }

        if name == "expand" {
            self.expect(Token::LParen)?;
            let arg = self.word()?;
            if arg != "_all_" {
                return Err(syntax(format!("unsupported expand({arg})")));
            }
            self.expect(Token::RParen)?;
            let children = if self.peek() == Some(&Token::LBrace) {
                Some(self.children()?)
            } else {
                None
            };
            return Ok(Selection::ExpandAll { children });
        }

        let (name, reverse) = match name.strip_prefix('~') {
            Some(forward) => (bare(forward), true),
            None => (bare(&name), false),
        };
        let filter = self.directives()?;
        let children = if self.peek() == Some(&Token::LBrace) {
            Some(self.children()?)
        } else {
            None
        };

        Ok(Selection::Predicate {
            alias,
            name,
            reverse,
            filter,
            children,
        })
    }

    fn or_expr(&mut self) -> Result<FilterExpr> {
        let mut left = self.and_expr()?;
        while self.is_word("or") {
            self.next();
            let right = self.and_expr()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<FilterExpr> {
        let mut left = self.unary()?;
        while self.is_word("and") {
            self.next();
            let right = self.unary()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<FilterExpr> {
        if self.is_word("not") {
            self.next();
            return Ok(FilterExpr::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.or_expr()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        Ok(FilterExpr::Func(self.func()?))
    }

    fn func(&mut self) -> Result<Func> {
        let name = self.word()?;
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next();
            return Ok(Func { name, args });
        }
        loop {
            args.push(self.arg()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                t => return Err(syntax(format!("expected , or ) in {name}(), found {t:?}"))),
            }
        }
        Ok(Func { name, args })
    }

    fn arg(&mut self) -> Result<Arg> {
        match self.next() {
            Some(Token::Word(w)) => Ok(Arg::Word(bare(&w))),
            Some(Token::Str(s)) => Ok(Arg::Str(s)),
            Some(Token::Regex { pattern, flags }) => Ok(Arg::Regex { pattern, flags }),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.next();
                    return Ok(Arg::List(items));
                }
                loop {
                    items.push(self.arg()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        t => return Err(syntax(format!("expected , or ] in list, found {t:?}"))),
                    }
                }
                Ok(Arg::List(items))
            }
            t => Err(syntax(format!("unexpected function argument {t:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_query() {
        let q = parse(
            "{ obj(func: uid(2)) { gid: uid expand(_all_) { gid: uid expand(_all_) dgraph.type } dgraph.type branches: ~Branch.proj { gid: uid expand(_all_) dgraph.type } } }",
        )
        .unwrap();
        let block = &q.blocks[0];
        assert_eq!(block.name, "obj");
        assert_eq!(block.root.name, "uid");
        assert_eq!(block.root.args, vec![Arg::Word("2".into())]);
        assert_eq!(block.selections.len(), 4);
        assert_eq!(block.selections[0], Selection::Uid { alias: "gid".into() });
        assert!(matches!(
            &block.selections[1],
            Selection::ExpandAll { children: Some(c) } if c.len() == 3
        ));
        assert!(matches!(
            &block.selections[3],
            Selection::Predicate { alias: Some(a), name, reverse: true, .. }
                if a == "branches" && name == "Branch.proj"
        ));
    }

    #[test]
    fn test_parse_paging_and_filter() {
        let q = parse(
            "{ objs(func: type(\"User\"), orderasc: User.age, first: 3, offset: 1) @filter(ge(User.age, 20) AND NOT (eq(User.name, \"A\") OR has(User.bio))) { uid } }",
        )
        .unwrap();
        let block = &q.blocks[0];
        assert_eq!(block.first, Some(3));
        assert_eq!(block.offset, Some(1));
        assert_eq!(
            block.order,
            vec![Order {
                attr: "User.age".into(),
                desc: false
            }]
        );
        match block.filter.as_ref().unwrap() {
            FilterExpr::And(left, right) => {
                assert!(matches!(left.as_ref(), FilterExpr::Func(f) if f.name == "ge"));
                assert!(matches!(right.as_ref(), FilterExpr::Not(inner)
                    if matches!(inner.as_ref(), FilterExpr::Or(_, _))));
            }
            other => panic!("unexpected filter {other:?}"),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let q = parse("{ q(func: has(a)) @filter(has(a) OR has(b) AND has(c)) { uid } }").unwrap();
        assert!(matches!(q.blocks[0].filter, Some(FilterExpr::Or(_, _))));
    }

    #[test]
    fn test_multiple_blocks() {
        let q = parse("{ a(func: has(x)) { uid } b(func: uid(0x1, 0x2)) { x } }").unwrap();
        assert_eq!(q.blocks.len(), 2);
        assert_eq!(q.blocks[1].root.args.len(), 2);
    }

    #[test]
    fn test_errors() {
        assert!(parse("{ q(first: 1) { uid } }").is_err());
        assert!(parse("{ q(func: has(a)) @cascade { uid } }").is_err());
        assert!(parse("{ q(func: has(a)) { uid }").is_err());
        assert!(parse("{ }").is_err());
    }
}
