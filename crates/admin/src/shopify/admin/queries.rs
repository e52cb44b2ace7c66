//! GraphQL documents for the Shopify Admin API.
//!
//! Each document holds exactly one named operation; the operation name is
//! sent alongside it in the request body.

use serde::Serialize;

/// A named GraphQL operation.
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    /// Operation name as declared in the document.
    pub name: &'static str,
    /// The document.
    pub document: &'static str,
}

// =============================================================================
// Product queries
// =============================================================================

/// Fields selected for every product node.
macro_rules! product_fields {
    () => {
        r"
        id
        title
        handle
        vendor
        productType
        tags
        descriptionHtml
        totalInventory
        seo { title description }
        images(first: 250) {
          nodes { id url altText width height }
        }
        "
    };
}

/// Fields selected for every product node when variants are needed.
macro_rules! product_with_variant_fields {
    () => {
        concat!(
            product_fields!(),
            r"
        variants(first: 250) {
          nodes {
            id
            title
            sku
            price
            inventoryQuantity
            selectedOptions { name value }
          }
        }
        "
        )
    };
}

/// One page of the `products` connection.
pub const PRODUCTS_PAGE: Operation = Operation {
    name: "ProductsPage",
    document: concat!(
        r"query ProductsPage($first: Int!, $after: String, $query: String) {
  products(first: $first, after: $after, query: $query) {
    nodes {",
        product_fields!(),
        r"    }
    pageInfo { hasNextPage endCursor }
  }
}"
    ),
};

/// One page of the `products` connection including variants.
pub const PRODUCTS_WITH_VARIANTS_PAGE: Operation = Operation {
    name: "ProductsWithVariantsPage",
    document: concat!(
        r"query ProductsWithVariantsPage($first: Int!, $after: String, $query: String) {
  products(first: $first, after: $after, query: $query) {
    nodes {",
        product_with_variant_fields!(),
        r"    }
    pageInfo { hasNextPage endCursor }
  }
}"
    ),
};

/// Exact-title product lookup, newest first.
pub const FIND_PRODUCTS: Operation = Operation {
    name: "FindProducts",
    document: r"query FindProducts($first: Int!, $query: String!) {
  products(first: $first, query: $query, sortKey: CREATED_AT, reverse: true) {
    nodes { id title }
  }
}",
};

/// Set a product's SEO title and description.
pub const UPDATE_PRODUCT_SEO: Operation = Operation {
    name: "UpdateProductSeo",
    document: r"mutation UpdateProductSeo($input: ProductInput!) {
  productUpdate(input: $input) {
    product { id seo { title description } }
    userErrors { field message }
  }
}",
};

/// Replace a product's description HTML.
pub const UPDATE_PRODUCT_DESCRIPTION: Operation = Operation {
    name: "UpdateProductDescription",
    document: r"mutation UpdateProductDescription($input: ProductInput!) {
  productUpdate(input: $input) {
    product { id }
    userErrors { field message }
  }
}",
};

// =============================================================================
// Collection queries
// =============================================================================

/// One page of a collection's `products` connection.
pub const COLLECTION_PRODUCTS_PAGE: Operation = Operation {
    name: "CollectionProductsPage",
    document: concat!(
        r"query CollectionProductsPage($id: ID!, $first: Int!, $after: String) {
  collection(id: $id) {
    products(first: $first, after: $after) {
      nodes {",
        product_fields!(),
        r"      }
      pageInfo { hasNextPage endCursor }
    }
  }
}"
    ),
};

/// One page of a collection's `products` connection including variants.
pub const COLLECTION_PRODUCTS_WITH_VARIANTS_PAGE: Operation = Operation {
    name: "CollectionProductsWithVariantsPage",
    document: concat!(
        r"query CollectionProductsWithVariantsPage($id: ID!, $first: Int!, $after: String) {
  collection(id: $id) {
    products(first: $first, after: $after) {
      nodes {",
        product_with_variant_fields!(),
        r"      }
      pageInfo { hasNextPage endCursor }
    }
  }
}"
    ),
};

/// A collection's SEO fields.
pub const COLLECTION_SEO: Operation = Operation {
    name: "CollectionSeo",
    document: r"query CollectionSeo($id: ID!) {
  collection(id: $id) {
    id
    title
    handle
    description
    seo { title description }
  }
}",
};

/// One page of the store's `collections` connection.
pub const COLLECTIONS_PAGE: Operation = Operation {
    name: "CollectionsPage",
    document: r"query CollectionsPage($first: Int!, $after: String) {
  collections(first: $first, after: $after) {
    nodes { id title handle }
    pageInfo { hasNextPage endCursor }
  }
}",
};

/// A collection's description HTML.
pub const COLLECTION_DESCRIPTION: Operation = Operation {
    name: "CollectionDescription",
    document: r"query CollectionDescription($id: ID!) {
  collection(id: $id) {
    id
    title
    handle
    descriptionHtml
  }
}",
};

/// Set a collection's SEO title and description.
pub const UPDATE_COLLECTION_SEO: Operation = Operation {
    name: "UpdateCollectionSeo",
    document: r"mutation UpdateCollectionSeo($input: CollectionInput!) {
  collectionUpdate(input: $input) {
    collection { id seo { title description } }
    userErrors { field message }
  }
}",
};

/// Replace a collection's description HTML.
pub const UPDATE_COLLECTION_DESCRIPTION: Operation = Operation {
    name: "UpdateCollectionDescription",
    document: r"mutation UpdateCollectionDescription($input: CollectionInput!) {
  collectionUpdate(input: $input) {
    collection { id }
    userErrors { field message }
  }
}",
};

// =============================================================================
// Variables
// =============================================================================

/// Variables for the `products` page queries.
#[derive(Debug, Clone, Serialize)]
pub struct ProductsPageVariables {
    /// Page size.
    pub first: u32,
    /// Cursor of the previous page.
    pub after: Option<String>,
    /// Shopify search syntax filter.
    pub query: Option<String>,
}

/// Variables for [`COLLECTIONS_PAGE`].
#[derive(Debug, Clone, Serialize)]
pub struct PageVariables {
    /// Page size.
    pub first: u32,
    /// Cursor of the previous page.
    pub after: Option<String>,
}

/// Variables for the collection page queries.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionProductsVariables {
    /// Collection gid.
    pub id: String,
    /// Page size.
    pub first: u32,
    /// Cursor of the previous page.
    pub after: Option<String>,
}

/// Variables for [`FIND_PRODUCTS`].
#[derive(Debug, Clone, Serialize)]
pub struct FindProductsVariables {
    /// Maximum matches.
    pub first: u32,
    /// Shopify search syntax filter.
    pub query: String,
}

/// Variables carrying only an id.
#[derive(Debug, Clone, Serialize)]
pub struct IdVariables {
    /// Resource gid.
    pub id: String,
}

/// Variables wrapping a mutation `input` object.
#[derive(Debug, Clone, Serialize)]
pub struct InputVariables<T> {
    /// Mutation input.
    pub input: T,
}

/// Build a `title:"..."` search term, escaping quotes and backslashes.
#[must_use]
pub fn exact_title_query(title: &str) -> String {
    let escaped = title.replace('\\', "\\\\").replace('"', "\\\"");
    format!("title:\"{escaped}\"")
}
